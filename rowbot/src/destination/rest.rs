use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use rowbot_config::shared::StoreConfig;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::debug;

use crate::bail;
use crate::destination::base::{Document, DocumentStore};
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Path of the documents endpoint of the REST API.
const DOCUMENTS_PATH: &str = "v1/documents";

/// Maximum number of response body bytes kept in error details.
const MAX_ERROR_BODY_LEN: usize = 512;

/// Document store writing through a MarkLogic style REST API.
///
/// Every write is a `PUT /v1/documents?uri=<uri>&collection=<c>...` with basic authentication.
/// The underlying [`reqwest::Client`] pools connections, so one store is shared by the whole job.
#[derive(Debug, Clone)]
pub struct RestDocumentStore {
    client: reqwest::Client,
    endpoint: String,
    username: String,
    password: Option<SecretString>,
    database: Option<String>,
}

impl RestDocumentStore {
    pub fn new(config: &StoreConfig) -> EtlResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        // Fail fast on a malformed endpoint.
        document_url(&config.url, "/", &[], config.database.as_deref())?;

        Ok(Self {
            client,
            endpoint: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
        })
    }
}

impl DocumentStore for RestDocumentStore {
    fn name() -> &'static str {
        "rest"
    }

    async fn write(&self, uri: &str, document: &Document, collections: &[String]) -> EtlResult<()> {
        let url = document_url(&self.endpoint, uri, collections, self.database.as_deref())?;

        let response = self
            .client
            .put(url)
            .basic_auth(
                &self.username,
                self.password.as_ref().map(|password| password.expose_secret()),
            )
            .header(CONTENT_TYPE, document.content_type())
            .body(document.body())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(uri, %status, "document written");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unable to read body>".to_string());
        let detail = format!("{uri}: status {status}: {}", truncate(&body, MAX_ERROR_BODY_LEN));

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => bail!(
                ErrorKind::AuthenticationError,
                "Document store rejected the credentials",
                detail = detail
            ),
            _ => bail!(
                ErrorKind::DestinationWriteFailed,
                "Document store rejected the write",
                detail = detail
            ),
        }
    }
}

/// Builds the URL that writes the document at `uri` into `collections`.
pub fn document_url(
    endpoint: &str,
    uri: &str,
    collections: &[String],
    database: Option<&str>,
) -> EtlResult<Url> {
    let base = format!("{}/{DOCUMENTS_PATH}", endpoint.trim_end_matches('/'));

    let mut params = vec![("uri", uri)];
    params.extend(collections.iter().map(|collection| ("collection", collection.as_str())));
    if let Some(database) = database {
        params.push(("database", database));
    }

    Url::parse_with_params(&base, params).map_err(|err| {
        etl_error!(
            ErrorKind::ConfigError,
            "Invalid document store URL",
            format!("{base}: {err}")
        )
    })
}

fn truncate(body: &str, max_len: usize) -> &str {
    if body.len() <= max_len {
        return body;
    }

    let mut end = max_len;
    while !body.is_char_boundary(end) {
        end -= 1;
    }

    &body[..end]
}

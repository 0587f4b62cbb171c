use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Installs the global metrics recorder and serves it for Prometheus at `addr`.
///
/// The exporter answers scrapes on every path of `addr`. It must be called from within a tokio
/// runtime, which drives the HTTP listener and the upkeep of the recorder.
pub fn init_metrics(addr: SocketAddr, job_name: Option<&str>) -> Result<(), BuildError> {
    let mut builder = PrometheusBuilder::new().with_http_listener(addr);

    if let Some(job_name) = job_name {
        builder = builder.add_global_label("job", job_name);
    }

    builder.install()?;

    Ok(())
}

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Decodes a Postgres `bytea` value in hex output format (`\x` followed by hex digit pairs).
pub fn parse_bytea_hex(value: &str) -> EtlResult<Vec<u8>> {
    let Some(digits) = value.strip_prefix("\\x") else {
        bail!(
            ErrorKind::ConversionError,
            "Could not decode bytea hex value",
            "The prefix '\\x' is missing"
        );
    };

    let digits = digits.as_bytes();
    if digits.len() % 2 != 0 {
        bail!(
            ErrorKind::ConversionError,
            "Could not decode bytea hex value",
            "The number of digits is odd"
        );
    }

    digits
        .chunks_exact(2)
        .map(|pair| -> EtlResult<u8> { Ok((hex_nibble(pair[0])? << 4) | hex_nibble(pair[1])?) })
        .collect()
}

fn hex_nibble(digit: u8) -> EtlResult<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => bail!(
            ErrorKind::ConversionError,
            "Could not decode bytea hex value",
            format!("Invalid hex digit byte 0x{other:02x}")
        ),
    }
}

//! Conversions from source text representations into rowbot values.

pub mod hex;

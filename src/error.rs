//! Domain error types for seams where callers match on a specific failure
//! kind rather than an opaque `anyhow::Error` (§4.9/§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{flag} must be a host:port address, got {value:?}")]
    InvalidAddress { flag: &'static str, value: String },
    #[error("at least one TCP server must be configured (use --tcp)")]
    NoTcpServer,
    #[error("{flag} must be positive and finite, got {value}")]
    InvalidDuration { flag: &'static str, value: f64 },
    #[error("{flag} has unrecognized byte framing {value:?} (want DATABITSPARITYSTOPBITS, e.g. 8E1)")]
    InvalidFraming { flag: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("downstream serial write failed: {0}")]
    Write(#[source] std::io::Error),
}

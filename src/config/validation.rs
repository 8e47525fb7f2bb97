//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (connection limit, windows, formats)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// HTTP/2 forbids flow-control windows above 2^31-1.
const MAX_WINDOW_SIZE: u32 = (1 << 31) - 1;

/// A single semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed config for semantic errors.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.max_connections == 0 {
        errors.push(ValidationError {
            field: "listener.max_connections",
            message: "must be greater than 0".into(),
        });
    }

    if config.listener.bind_address().parse::<SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "listener.host",
            message: format!("'{}' is not a valid IP address", config.listener.host),
        });
    }

    for (field, window) in [
        ("http2.initial_stream_window_size", config.http2.initial_stream_window_size),
        (
            "http2.initial_connection_window_size",
            config.http2.initial_connection_window_size,
        ),
    ] {
        if window.is_some_and(|w| w > MAX_WINDOW_SIZE) {
            errors.push(ValidationError {
                field,
                message: format!("must not exceed {}", MAX_WINDOW_SIZE),
            });
        }
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError {
            field: "observability.log_format",
            message: format!("unknown format '{}'", config.observability.log_format),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError {
            field: "observability.metrics_address",
            message: "must be a socket address".into(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

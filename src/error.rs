//! Crate-wide error type.

use thiserror::Error;

use crate::config::loader::ConfigError;

/// Errors surfaced by the server, the client and the compression codec.
#[derive(Debug, Error)]
pub enum Error {
    /// The client was given something that is neither a descriptor file nor a descriptor.
    #[error("Invalid Interface: {0}")]
    InvalidInterface(String),

    /// A descriptor file could not be read or parsed.
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// The underlying connection or stream failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Compression or decompression failed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// The server configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A call was issued on a client whose connection is already closed.
    #[error("Connection closed")]
    Closed,
}

impl From<hyper::Error> for Error {
    fn from(e: hyper::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

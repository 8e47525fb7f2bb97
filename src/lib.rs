//! Minimal RPC over HTTP/2 streams.
//!
//! A [`Server`] exposes named procedures at `/name`; a [`Client`] resolves a
//! service descriptor and calls them with an optional text payload.

pub mod client;
pub mod compression;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use client::Client;
pub use compression::{compress, decompress};
pub use config::{DescriptorSource, ServerConfig, ServiceDescriptor};
pub use context::{Context, HeaderSet, RequestContext, ResponseContext};
pub use error::{Error, Result};
pub use http::{Middleware, Procedure, Server};
pub use lifecycle::ShutdownHook;

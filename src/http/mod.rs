//! HTTP/2 RPC server subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::Listener)
//!     → server.rs (hyper HTTP/2 connection, Axum fallback handler)
//!     → request.rs (headers + accumulated body → Context)
//!     → dispatch.rs (routing key → middleware chain → procedure)
//!     → response.rs (status, headers, optional gzip+base64 body)
//!     → terminal write closes the stream
//! ```

pub mod dispatch;
pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use dispatch::Dispatcher;
pub use handler::{Middleware, Procedure};
pub use server::Server;

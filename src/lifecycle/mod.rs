//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     close(true) / signal / accept-loop failure
//!         → run shutdown hook (at most once)
//!         → broadcast stop → accept loop exits, connections send GOAWAY and drain
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/SIGUSR1/SIGUSR2 → Server::close(true)
//! ```
//!
//! # Design Decisions
//! - The hook slot is owned by each server instance, not process-global state
//! - Hook runs before the listening endpoint is closed
//! - Shutdown has a drain timeout: open connections are abandoned after it

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownHook};
pub use signals::termination_signal;

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! server config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!
//! service descriptor (JSON/TOML file or inline value)
//!     → descriptor.rs (parse, {ENV} substitution)
//!     → ServiceDescriptor (resolved once, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod descriptor;
pub mod loader;
pub mod schema;
pub mod validation;

pub use descriptor::{DescriptorSource, ServiceDescriptor};
pub use loader::{load_config, ConfigError};
pub use schema::{Http2Config, ListenerConfig, ObservabilityConfig, ServerConfig, ShutdownConfig};

//! Service descriptor resolution.
//!
//! # Responsibilities
//! - Accept a descriptor file path or an inline descriptor value
//! - Parse JSON (default) or TOML (`.toml` extension) descriptor files
//! - Replace `{KEY}` placeholders with environment values, once, at construction
//!
//! # Design Decisions
//! - Substitution is a pure function over an injectable lookup
//! - A whole-field placeholder only; `a{B}c` is taken literally
//! - The port placeholder resolves into `port`

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fallback for an unresolved `endpoint` placeholder.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080";
/// Fallback for unresolved `name` and `version` placeholders.
pub const DEFAULT_LABEL: &str = "Unknown";
/// Fallback for an unresolved `port` placeholder.
pub const DEFAULT_PORT: &str = "8400";

/// Resolved description of a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub endpoint: String,
    pub version: String,
    #[serde(deserialize_with = "port_text")]
    pub port: String,
    #[serde(alias = "procs", default)]
    pub procedures: Vec<String>,
}

/// Ports may be written as `"4196"`, `4196` or `"{PORT}"`.
fn port_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Text(s) => s,
        Port::Number(n) => n.to_string(),
    })
}

/// Where a client gets its descriptor from.
#[derive(Debug, Clone)]
pub enum DescriptorSource {
    /// A descriptor file on disk.
    Path(PathBuf),
    /// An already-built descriptor.
    Inline(ServiceDescriptor),
    /// Loosely typed input: a string is a path, an object is a descriptor.
    Value(serde_json::Value),
}

impl From<&str> for DescriptorSource {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<&Path> for DescriptorSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for DescriptorSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<ServiceDescriptor> for DescriptorSource {
    fn from(descriptor: ServiceDescriptor) -> Self {
        Self::Inline(descriptor)
    }
}

impl From<serde_json::Value> for DescriptorSource {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

impl DescriptorSource {
    /// Load and resolve against the process environment.
    pub fn resolve(self) -> Result<ServiceDescriptor> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Load and resolve against an arbitrary variable lookup.
    pub fn resolve_with<F>(self, lookup: F) -> Result<ServiceDescriptor>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = match self {
            Self::Path(path) => load_descriptor(&path)?,
            Self::Inline(descriptor) => descriptor,
            Self::Value(serde_json::Value::String(path)) => load_descriptor(Path::new(&path))?,
            Self::Value(value @ serde_json::Value::Object(_)) => serde_json::from_value(value)
                .map_err(|e| Error::InvalidInterface(e.to_string()))?,
            Self::Value(other) => {
                return Err(Error::InvalidInterface(format!(
                    "expected a path or a descriptor object, got {}",
                    other
                )));
            }
        };
        Ok(substitute(raw, lookup))
    }
}

/// Read a descriptor file without substituting placeholders.
pub fn load_descriptor(path: &Path) -> Result<ServiceDescriptor> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Descriptor(format!("{}: {}", path.display(), e)))?;

    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    if is_toml {
        toml::from_str(&content).map_err(|e| Error::Descriptor(format!("{}: {}", path.display(), e)))
    } else {
        serde_json::from_str(&content)
            .map_err(|e| Error::Descriptor(format!("{}: {}", path.display(), e)))
    }
}

/// Replace whole-field `{KEY}` placeholders using `lookup`.
pub fn substitute<F>(mut descriptor: ServiceDescriptor, lookup: F) -> ServiceDescriptor
where
    F: Fn(&str) -> Option<String>,
{
    descriptor.endpoint = expand(descriptor.endpoint, DEFAULT_ENDPOINT, &lookup);
    descriptor.name = expand(descriptor.name, DEFAULT_LABEL, &lookup);
    descriptor.version = expand(descriptor.version, DEFAULT_LABEL, &lookup);
    descriptor.port = expand(descriptor.port, DEFAULT_PORT, &lookup);
    descriptor
}

fn expand<F>(value: String, default: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match placeholder(&value) {
        Some(key) => lookup(key)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()),
        None => value,
    }
}

fn placeholder(value: &str) -> Option<&str> {
    value.strip_prefix('{')?.strip_suffix('}')
}

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! binary defaults (ServiceConfig::backend / ::frontend)
//!     → loader.rs (optional TOML file, deep-merged)
//!     → loader.rs (environment variable overrides)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults so both services start with no file at all
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    DatastoreConfig, ListenerConfig, ObservabilityConfig, ServiceConfig, ServiceIdentity,
    TimeoutConfig, TracingConfig, UpstreamConfig,
};

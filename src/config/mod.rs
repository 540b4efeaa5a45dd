//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → Server::new
//! ```
//!
//! # Design Decisions
//! - Config is read once when the server is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{HttpConfig, ListenerConfig, LoggingConfig, MetricsConfig, ServerConfig, SessionConfig, TlsConfig};
pub use validation::{validate_config, ValidationError};

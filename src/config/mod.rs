//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → ServerConfig snapshot handed to the supervisor and, by value, to
//!       every worker it forks
//!
//! On SIGHUP:
//!     supervisor asks its ConfigSource for a fresh Config
//!     → validation.rs validates
//!     → new snapshot compared field by field with the old one
//!     → socket reconciled, new worker generation spawned
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, ConfigSource, FileSource};
pub use schema::{Config, LoggingConfig, ServerConfig};
pub use validation::ValidationError;

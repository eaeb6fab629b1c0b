//! Domain-driven configuration management for Conduit
//!
//! Configuration is split by functional domain (execution, logging), with
//! validation, defaults, and environment variable support.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    execution::ExecutionConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    ConduitConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;

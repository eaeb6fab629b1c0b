//! Structured logging initialisation for Conduit
//!
//! The engine itself only emits `tracing` events and spans; this crate
//! installs a global subscriber configured from
//! [`conduit_config::LoggingConfig`].

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};

//! Core types for the Conduit process execution engine
//!
//! This crate contains the value types shared by the engine: the error
//! taxonomy, validation policy, argument tokens and their escaping rules,
//! environment overrides, text encodings and the execution result. It does
//! no I/O and has minimal dependencies.

pub mod arguments;
pub mod encoding;
pub mod environment;
pub mod error;
pub mod result;
pub mod validation;

// Re-export commonly used types at the crate root
pub use arguments::{Argument, Arguments, ArgumentsBuilder};
pub use encoding::{TextDecoder, TextEncoding};
pub use environment::{EnvironmentVariables, EnvironmentVariablesBuilder};
pub use error::{CommandError, CommandResult, ErrorKind, StandardStream};
pub use result::ExecutionResult;
pub use validation::ValidationPolicy;

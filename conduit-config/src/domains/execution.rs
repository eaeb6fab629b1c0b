//! Process execution configuration

use conduit_core::TextEncoding;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_at_most, validate_positive, Validatable};

/// Largest copy buffer accepted for a single pipe
const MAX_PIPE_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Process execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Size in bytes of the buffer used for each pipe copy
    #[serde(default = "default_pipe_buffer_size")]
    pub pipe_buffer_size: usize,

    /// Time a gracefully cancelled process gets to exit before it is killed
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_kill_grace_period")]
    pub kill_grace_period: Duration,

    /// Encoding used by buffered runs and text pipes when none is given
    #[serde(default)]
    pub default_encoding: TextEncoding,

    /// Number of undelivered events buffered by an event stream
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            pipe_buffer_size: default_pipe_buffer_size(),
            kill_grace_period: default_kill_grace_period(),
            default_encoding: TextEncoding::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl Validatable for ExecutionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.pipe_buffer_size, "pipe_buffer_size", self.domain_name())?;
        validate_at_most(
            self.pipe_buffer_size,
            MAX_PIPE_BUFFER_SIZE,
            "pipe_buffer_size",
            self.domain_name(),
        )?;

        validate_positive(
            self.event_channel_capacity,
            "event_channel_capacity",
            self.domain_name(),
        )?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "execution"
    }
}

// Default value functions
fn default_pipe_buffer_size() -> usize {
    81920
}

fn default_kill_grace_period() -> Duration {
    Duration::from_secs(10)
}

fn default_event_channel_capacity() -> usize {
    256
}

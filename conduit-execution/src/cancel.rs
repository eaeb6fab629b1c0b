//! Run-scoped cancellation signals
//!
//! A run observes two [`CancellationToken`]s. The forceful token kills the
//! process immediately; the graceful token first asks it to stop (SIGINT on
//! Unix) and only kills it once the configured grace period has elapsed.
//! Either way the run ends with [`CommandError::Cancelled`].
//!
//! [`CommandError::Cancelled`]: conduit_core::CommandError::Cancelled

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancellation signals for one run
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    forceful: CancellationToken,
    graceful: CancellationToken,
    /// Stops the timeout task once the last clone is dropped
    timer: Option<Arc<DropGuard>>,
}

impl Cancellation {
    /// Signals that are never triggered unless the caller keeps a handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Only forceful cancellation, driven by the given token
    pub fn forceful(token: CancellationToken) -> Self {
        Self {
            forceful: token,
            graceful: CancellationToken::new(),
            timer: None,
        }
    }

    /// Add a graceful cancellation token
    pub fn with_graceful(mut self, token: CancellationToken) -> Self {
        self.graceful = token;
        self
    }

    /// Forcefully cancel once `timeout` has elapsed
    ///
    /// The timer lives as long as this value or one of its clones, so it
    /// ends with the run that owns it. Must be called from within a tokio
    /// runtime.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let token = self.forceful.clone();
        let stop = CancellationToken::new();
        let stopped = stop.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = stopped.cancelled() => {}
                _ = tokio::time::sleep(timeout) => token.cancel(),
            }
        });
        self.timer = Some(Arc::new(stop.drop_guard()));
        self
    }

    pub fn forceful_token(&self) -> &CancellationToken {
        &self.forceful
    }

    pub fn graceful_token(&self) -> &CancellationToken {
        &self.graceful
    }

    /// Trigger forceful cancellation
    pub fn cancel(&self) {
        self.forceful.cancel();
    }

    /// Trigger graceful cancellation
    pub fn cancel_gracefully(&self) {
        self.graceful.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.forceful.is_cancelled() || self.graceful.is_cancelled()
    }
}

impl From<CancellationToken> for Cancellation {
    fn from(token: CancellationToken) -> Self {
        Cancellation::forceful(token)
    }
}

impl From<&CancellationToken> for Cancellation {
    fn from(token: &CancellationToken) -> Self {
        Cancellation::forceful(token.clone())
    }
}

impl From<()> for Cancellation {
    fn from(_: ()) -> Self {
        Cancellation::new()
    }
}

//! Execution result

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of a completed process run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code of the process; on Unix a process killed by signal `n` reports `128 + n`
    pub exit_code: i32,

    /// Operating system identifier of the process
    pub process_id: u32,

    /// Decoded standard output, present for buffered runs
    pub stdout: Option<String>,

    /// Decoded standard error, present for buffered runs
    pub stderr: Option<String>,

    pub started_at: DateTime<Utc>,
    pub exited_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Check whether the process exited with code zero
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Wall-clock time between start and exit
    pub fn run_time(&self) -> Duration {
        (self.exited_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Attach captured output
    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = Some(stdout);
        self.stderr = Some(stderr);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: i32) -> ExecutionResult {
        let started_at = Utc::now();
        ExecutionResult {
            exit_code,
            process_id: 42,
            stdout: None,
            stderr: None,
            started_at,
            exited_at: started_at + chrono::Duration::milliseconds(250),
        }
    }

    #[test]
    fn test_run_time_and_success() {
        let ok = result(0);
        assert!(ok.is_success());
        assert_eq!(ok.run_time(), Duration::from_millis(250));
        assert!(!result(7).is_success());
    }

    #[test]
    fn test_with_output() {
        let buffered = result(0).with_output("out".to_string(), String::new());
        assert_eq!(buffered.stdout.as_deref(), Some("out"));
        assert_eq!(buffered.stderr.as_deref(), Some(""));
    }
}

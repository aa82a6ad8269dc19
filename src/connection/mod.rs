//! Command execution layer.
//!
//! Modules that drive local tools do so through the [`Connection`] trait so
//! tests can substitute a scripted implementation. [`LocalConnection`] runs
//! commands through `sh -c` on the current host.
//!
//! # Example
//!
//! ```rust,ignore
//! use ovd_modules::connection::{Connection, LocalConnection};
//!
//! let conn = LocalConnection::new();
//! let result = conn.execute("ovd-slaveserver-role -m '/srv/ovd' ls", None).await?;
//! println!("{}", result.stdout);
//! ```

/// Local execution connection implementation.
pub mod local;

use async_trait::async_trait;
use thiserror::Error;

pub use local::LocalConnection;

/// Errors that can occur while running a command.
///
/// A non-zero exit status is not an error at this level; it is reported in
/// the [`CommandResult`].
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The command could not be spawned or awaited.
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// The command did not finish within the allotted seconds.
    #[error("Command timed out after {0} seconds")]
    Timeout(u64),
}

/// Result type for connection operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Outcome of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code of the command (0 typically indicates success).
    pub exit_code: i32,
    /// Content written to standard output.
    pub stdout: String,
    /// Content written to standard error.
    pub stderr: String,
    /// Convenience flag: `true` if `exit_code == 0`.
    pub success: bool,
}

impl CommandResult {
    /// Create a new successful command result
    pub fn success(stdout: String, stderr: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            stderr,
            success: true,
        }
    }

    /// Create a new failed command result
    pub fn failure(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: false,
        }
    }

    /// Get the combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Options for command execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Timeout in seconds (None for no timeout)
    pub timeout: Option<u64>,
}

impl ExecuteOptions {
    /// Create new execute options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Something that can run shell command lines
#[async_trait]
pub trait Connection: Send + Sync {
    /// Name of the host commands run on, for logs
    fn identifier(&self) -> &str;

    /// Run `command` through the shell and collect its output
    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let both = CommandResult::failure(1, "out".into(), "err".into());
        assert_eq!(both.combined_output(), "out\nerr");
        assert!(!both.success);

        let only_out = CommandResult::success("out".into(), String::new());
        assert_eq!(only_out.combined_output(), "out");
        assert_eq!(only_out.exit_code, 0);
    }
}

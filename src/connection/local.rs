//! Local connection module
//!
//! Runs commands on the current host without any network transport.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{CommandResult, Connection, ConnectionError, ConnectionResult, ExecuteOptions};

/// Local connection for executing commands on the current host
#[derive(Debug, Clone, Default)]
pub struct LocalConnection;

impl LocalConnection {
    /// Create a new local connection
    pub fn new() -> Self {
        Self
    }

    fn build_command(&self, command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);

        cmd.kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        cmd
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn identifier(&self) -> &str {
        "localhost"
    }

    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult> {
        let options = options.unwrap_or_default();
        debug!(command = %command, "Executing local command");

        let child = self.build_command(command).spawn().map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to spawn process: {}", e))
        })?;

        let wait_future = child.wait_with_output();
        let output = match options.timeout {
            Some(timeout_secs) => {
                let timeout = tokio::time::Duration::from_secs(timeout_secs);
                tokio::time::timeout(timeout, wait_future)
                    .await
                    .map_err(|_| ConnectionError::Timeout(timeout_secs))?
            }
            None => wait_future.await,
        }
        .map_err(|e| ConnectionError::ExecutionFailed(format!("Failed to wait for process: {}", e)))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        trace!(exit_code = %exit_code, stdout_len = %stdout.len(), stderr_len = %stderr.len(), "Command completed");

        if output.status.success() {
            Ok(CommandResult::success(stdout, stderr))
        } else {
            Ok(CommandResult::failure(exit_code, stdout, stderr))
        }
    }
}

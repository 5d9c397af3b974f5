use crate::media::MediaError;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

#[derive(Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `program` to completion. The child is killed if the timeout elapses.
    pub async fn execute(&self, program: &str, args: &[String]) -> Result<Output, MediaError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            program = %program,
            args = ?args,
            timeout_secs = %self.timeout.as_secs(),
            "Executing command"
        );

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| MediaError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| MediaError::Spawn {
                program: program.to_string(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // ffmpeg prints its banner first; the cause is at the end
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");

            tracing::error!(program = %program, stderr = %tail, "Command failed");
            return Err(MediaError::CommandFailed {
                program: program.to_string(),
                stderr: tail,
            });
        }

        tracing::debug!(
            program = %program,
            output_size = output.stdout.len(),
            "Command succeeded"
        );

        Ok(output)
    }
}

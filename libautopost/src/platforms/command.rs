//! Publisher that delegates to an external program
//!
//! The program receives the post as a JSON object on stdin. Exit status 0 means
//! the post was published. Its stdout is either a JSON object with an `id`
//! field, or plain text whose first non-empty line is the remote post id.
//! A non-zero exit is a failed try carrying stderr.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::PlatformConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::{PublishReceipt, Publisher};
use crate::types::Post;

pub struct CommandPublisher {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandPublisher {
    pub fn new(name: &str, config: &PlatformConfig) -> Self {
        Self {
            name: name.to_string(),
            program: shellexpand::tilde(&config.command).to_string(),
            args: config.args.clone(),
            timeout: config.timeout(),
        }
    }

    fn receipt_from_stdout(stdout: &str) -> PublishReceipt {
        let trimmed = stdout.trim();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if value.is_object() {
                let id = match &value["id"] {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                };
                return PublishReceipt {
                    platform_post_id: id,
                    response: Some(value),
                };
            }
        }

        PublishReceipt {
            platform_post_id: trimmed
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string),
            response: None,
        }
    }
}

#[async_trait]
impl Publisher for CommandPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, post: &Post) -> Result<PublishReceipt> {
        let input = serde_json::to_vec(post)
            .map_err(|e| PlatformError::Validation(format!("cannot serialize post: {}", e)))?;

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .env("AUTOPOST_PLATFORM", &self.name)
            .env("AUTOPOST_POST_ID", &post.id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(platform = %self.name, program = %self.program, post_id = %post.id, "Running publish command");

        let mut child = cmd.spawn().map_err(|e| {
            PlatformError::Publish(format!("failed to start '{}': {}", self.program, e))
        })?;

        let stdin = child.stdin.take();
        let run = async move {
            if let Some(mut stdin) = stdin {
                // A program that ignores stdin may exit before reading it
                if let Err(e) = stdin.write_all(&input).await {
                    debug!(error = %e, "Publish command closed stdin early");
                }
            }
            child.wait_with_output().await
        };

        // Bounds the stdin write as well as the wait; dropping `run` kills the child
        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                PlatformError::Timeout(format!(
                    "'{}' did not finish within {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| PlatformError::Publish(format!("'{}' failed: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            warn!(
                platform = %self.name,
                exit_code = ?output.status.code(),
                stderr = %stderr.trim(),
                "Publish command failed"
            );
            let detail = match stderr.trim() {
                "" => format!("exit status {}", output.status),
                s => s.to_string(),
            };
            return Err(PlatformError::Publish(detail).into());
        }

        Ok(Self::receipt_from_stdout(&stdout))
    }
}

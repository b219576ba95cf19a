//! Minimal SSH command adapter.
//!
//! Inventory collection and reassignment execution both shell out to the
//! brokers over `ssh` in batch mode. Commands are passed as a single
//! remote string, so anything interpolated into one goes through
//! [`quote`] first.

use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Errors from running a remote command.
#[derive(Debug, thiserror::Error)]
pub enum SshError {
    #[error("failed to spawn ssh: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to stream stdin to ssh: {0}")]
    Stdin(#[source] std::io::Error),
    #[error("ssh to {host} failed ({status}): {stderr}")]
    CommandFailed {
        host: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("output from {host} is not valid utf-8")]
    NonUtf8Output { host: String },
}

/// Captured streams of a successful remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A broker reachable over `ssh` in batch mode (key auth only, no
/// prompts).
#[derive(Debug, Clone)]
pub struct SshClient {
    host: String,
    user: String,
}

impl SshClient {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn command(&self, remote: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes", "-l", &self.user, &self.host, "--", remote]);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Runs a command on the broker and captures its output.
    ///
    /// # Errors
    ///
    /// [`SshError`] if `ssh` cannot be spawned, exits non-zero, or
    /// produces non-UTF-8 output.
    pub async fn run(&self, remote: &str) -> Result<CommandOutput, SshError> {
        debug!(host = %self.host, command = remote, "running remote command");
        let output = self
            .command(remote)
            .output()
            .await
            .map_err(SshError::Spawn)?;
        self.check(output)
    }

    /// Writes `contents` to `remote_path` on the broker by streaming it
    /// through the remote shell's stdin.
    ///
    /// # Errors
    ///
    /// [`SshError`] if `ssh` cannot be spawned, the stream breaks, or the
    /// remote write fails.
    pub async fn upload(&self, contents: &[u8], remote_path: &str) -> Result<(), SshError> {
        debug!(host = %self.host, path = remote_path, bytes = contents.len(), "uploading file");
        let mut cmd = self.command(&format!("cat > {}", quote(remote_path)));
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(SshError::Spawn)?;
        let mut stdin = child.stdin.take().expect("stdin was piped");
        stdin.write_all(contents).await.map_err(SshError::Stdin)?;
        drop(stdin);
        let output = child.wait_with_output().await.map_err(SshError::Spawn)?;
        self.check(output).map(|_| ())
    }

    fn check(&self, output: std::process::Output) -> Result<CommandOutput, SshError> {
        if !output.status.success() {
            return Err(SshError::CommandFailed {
                host: self.host.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let stdout = String::from_utf8(output.stdout).map_err(|_| SshError::NonUtf8Output {
            host: self.host.clone(),
        })?;
        Ok(CommandOutput { stdout, stderr })
    }
}

/// POSIX single-quote escaping for a remote shell argument.
#[must_use]
pub fn quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

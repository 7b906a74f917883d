//! External command execution

use std::process::Stdio;

use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Captured result of an external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Human readable reason for a failed command
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    /// Case-insensitive search of stderr
    pub fn stderr_contains(&self, needle: &str) -> bool {
        self.stderr.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// Run a command to completion, capturing its output
///
/// When `stdin` is given it is written to the child and the pipe closed, so
/// secrets never appear on the command line.
pub async fn run_captured(
    program: &str,
    args: &[String],
    stdin: Option<&SecretString>,
) -> std::io::Result<CommandOutput> {
    debug!("Running: {} {}", program, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let (Some(secret), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(secret.expose_secret().as_bytes()).await?;
        drop(pipe);
    }

    let output = child.wait_with_output().await?;
    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command with its output streamed to the terminal
///
/// Used for long-running steps (builds, pushes) whose progress the operator
/// wants to see.
pub async fn run_streamed(program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
    debug!("Running: {} {}", program, args.join(" "));

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await?;

    Ok(CommandOutput {
        success: status.success(),
        code: status.code(),
        stdout: String::new(),
        stderr: String::new(),
    })
}

/// Build an owned argument vector from string slices
pub fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

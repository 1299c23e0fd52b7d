//! Process execution abstraction
//!
//! Every external tool this crate touches (git, the GitHub CLI, package
//! managers, the AI CLI, the terminal launcher script) is invoked through
//! the [`CommandRunner`] trait so each adapter can be exercised in tests
//! with a scripted runner instead of a live system.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Captured result of a finished external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Convenience constructor for a successful run with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Convenience constructor for a failed run with the given stderr
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external commands to completion, capturing their output.
///
/// `run` returns `Err` only when the process could not be spawned at all
/// (for example the binary does not exist); a non-zero exit is reported
/// through [`CommandOutput::status`] so callers can decide whether that is
/// fatal for them.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>)
        -> Result<CommandOutput>;
}

/// Production runner backed by `tokio::process::Command`
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput> {
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.with_context(|| {
            format!("Failed to execute command: {} {}", program, args.join(" "))
        })?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_runner_captures_stdout() {
        let runner = SystemRunner;
        let output = runner.run("echo", &["hello"], None).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_system_runner_missing_binary_is_spawn_error() {
        let runner = SystemRunner;
        let result = runner
            .run("definitely-not-a-real-binary-grove", &[], None)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_output_constructors() {
        assert!(CommandOutput::ok("x").success());
        assert!(!CommandOutput::failed(1, "boom").success());
    }
}

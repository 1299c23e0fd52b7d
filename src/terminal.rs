//! Terminal application detection and launching
//!
//! Launching delegates to a single external launcher script invoked as
//! `<script> <app-id> <command-string>`. A failed launch is reported as
//! `false`, never as an error: the worktree is already valid and usable
//! manually, so a missing terminal must not fail the creation flow.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::process::CommandRunner;
use crate::util::shell_quote;

/// Supported terminal applications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalApp {
    /// The platform-native terminal, always considered installed
    Terminal,
    Iterm,
    Warp,
    Wezterm,
}

impl TerminalApp {
    pub const ALL: [TerminalApp; 4] = [
        TerminalApp::Terminal,
        TerminalApp::Iterm,
        TerminalApp::Warp,
        TerminalApp::Wezterm,
    ];

    /// Identifier used in configuration, CLI flags, and the launcher script
    pub fn id(&self) -> &'static str {
        match self {
            TerminalApp::Terminal => "terminal",
            TerminalApp::Iterm => "iterm",
            TerminalApp::Warp => "warp",
            TerminalApp::Wezterm => "wezterm",
        }
    }

    /// Application name as registered with the OS
    pub fn app_name(&self) -> &'static str {
        match self {
            TerminalApp::Terminal => "Terminal",
            TerminalApp::Iterm => "iTerm",
            TerminalApp::Warp => "Warp",
            TerminalApp::Wezterm => "WezTerm",
        }
    }
}

impl Default for TerminalApp {
    fn default() -> Self {
        Self::Terminal
    }
}

impl fmt::Display for TerminalApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for TerminalApp {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "terminal" => Ok(TerminalApp::Terminal),
            "iterm" | "iterm2" => Ok(TerminalApp::Iterm),
            "warp" => Ok(TerminalApp::Warp),
            "wezterm" => Ok(TerminalApp::Wezterm),
            other => Err(format!(
                "unknown terminal app '{other}' (expected one of: terminal, iterm, warp, wezterm)"
            )),
        }
    }
}

pub struct TerminalLauncher {
    runner: Arc<dyn CommandRunner>,
    launcher_script: PathBuf,
}

impl TerminalLauncher {
    pub fn new(runner: Arc<dyn CommandRunner>, launcher_script: PathBuf) -> Self {
        Self {
            runner,
            launcher_script,
        }
    }

    /// Check whether a terminal application is installed.
    ///
    /// The native terminal is always available; the rest are probed through
    /// the OS application lookup (`open -Ra <name>`).
    pub async fn is_installed(&self, app: TerminalApp) -> bool {
        if app == TerminalApp::Terminal {
            return true;
        }

        match self
            .runner
            .run("open", &["-Ra", app.app_name()], None)
            .await
        {
            Ok(output) => output.success(),
            Err(_) => false,
        }
    }

    /// Open `app` in `working_dir` running `command`.
    ///
    /// Returns `false` when the launcher script is missing or exits
    /// non-zero.
    pub async fn launch(&self, app: TerminalApp, working_dir: &Path, command: &str) -> bool {
        if !self.launcher_script.is_file() {
            warn!(
                "Terminal launcher script not found at {}; skipping terminal launch",
                self.launcher_script.display()
            );
            return false;
        }

        let composed = format!(
            "cd {} && {}",
            shell_quote(&working_dir.to_string_lossy()),
            command
        );

        let script = self.launcher_script.to_string_lossy().to_string();
        match self
            .runner
            .run(&script, &[app.id(), &composed], None)
            .await
        {
            Ok(output) if output.success() => {
                debug!("Launched {} in {}", app.app_name(), working_dir.display());
                true
            }
            Ok(output) => {
                warn!(
                    "Terminal launcher exited with status {}: {}",
                    output.status,
                    output.stderr.trim()
                );
                false
            }
            Err(err) => {
                warn!("Failed to run terminal launcher: {err:#}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::testing::ScriptedRunner;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_terminal_app() {
        assert_eq!("warp".parse::<TerminalApp>().unwrap(), TerminalApp::Warp);
        assert_eq!("iTerm2".parse::<TerminalApp>().unwrap(), TerminalApp::Iterm);
        assert!("kitty".parse::<TerminalApp>().is_err());
    }

    #[tokio::test]
    async fn test_native_terminal_always_installed() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_to_spawn("open");
        let launcher = TerminalLauncher::new(runner.clone(), PathBuf::from("/nonexistent"));

        assert!(launcher.is_installed(TerminalApp::Terminal).await);
        assert_eq!(runner.call_count("open"), 0);
    }

    #[tokio::test]
    async fn test_probe_other_terminals() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("open", &["-Ra", "Warp"], CommandOutput::ok(""));
        runner.respond(
            "open",
            &["-Ra", "WezTerm"],
            CommandOutput::failed(1, "Unable to find application"),
        );
        let launcher = TerminalLauncher::new(runner, PathBuf::from("/nonexistent"));

        assert!(launcher.is_installed(TerminalApp::Warp).await);
        assert!(!launcher.is_installed(TerminalApp::Wezterm).await);
    }

    #[tokio::test]
    async fn test_launch_missing_script_returns_false() {
        let runner = Arc::new(ScriptedRunner::new());
        let launcher = TerminalLauncher::new(runner.clone(), PathBuf::from("/no/such/script.sh"));

        let launched = launcher
            .launch(TerminalApp::Terminal, Path::new("/tmp"), "echo hi")
            .await;
        assert!(!launched);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_launch_composes_cd_command() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("open-terminal.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        let launcher = TerminalLauncher::new(runner.clone(), script);

        let launched = launcher
            .launch(TerminalApp::Warp, Path::new("/work/my tree"), "claude")
            .await;
        assert!(launched);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("warp"));
        assert!(calls[0].contains("cd '/work/my tree' && claude"));
    }

    #[tokio::test]
    async fn test_launch_nonzero_exit_returns_false() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("open-terminal.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        let script_str = script.to_string_lossy().to_string();

        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(&script_str, &[], CommandOutput::failed(2, "no display"));
        let launcher = TerminalLauncher::new(runner, script);

        let launched = launcher
            .launch(TerminalApp::Terminal, Path::new("/tmp"), "true")
            .await;
        assert!(!launched);
    }
}

//! Package manager detection and dependency installation
//!
//! Detection is lockfile-driven with a fixed precedence order; installation
//! shells out to the detected tool and reports failure as a boolean so the
//! caller can continue the broader workflow with a warning.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::process::CommandRunner;

/// Configured package manager preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerChoice {
    Auto,
    Bun,
    Pnpm,
    Yarn,
    Npm,
}

impl Default for PackageManagerChoice {
    fn default() -> Self {
        Self::Auto
    }
}

/// A concrete package manager tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManagerKind {
    Bun,
    Pnpm,
    Yarn,
    Npm,
}

impl PackageManagerKind {
    /// Detection precedence, fastest and most specific lockfile first
    pub const DETECTION_ORDER: [PackageManagerKind; 4] = [
        PackageManagerKind::Bun,
        PackageManagerKind::Pnpm,
        PackageManagerKind::Yarn,
        PackageManagerKind::Npm,
    ];

    pub fn command(&self) -> &'static str {
        match self {
            PackageManagerKind::Bun => "bun",
            PackageManagerKind::Pnpm => "pnpm",
            PackageManagerKind::Yarn => "yarn",
            PackageManagerKind::Npm => "npm",
        }
    }

    pub fn lockfile(&self) -> &'static str {
        match self {
            PackageManagerKind::Bun => "bun.lockb",
            PackageManagerKind::Pnpm => "pnpm-lock.yaml",
            PackageManagerKind::Yarn => "yarn.lock",
            PackageManagerKind::Npm => "package-lock.json",
        }
    }
}

/// How a package manager was chosen for a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionSource {
    Lockfile(&'static str),
    ManifestDefault,
    Configured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManagerInfo {
    pub kind: PackageManagerKind,
    pub source: DetectionSource,
}

/// Detect the package manager for a project directory.
///
/// Returns `None` only when no `package.json` manifest exists at all,
/// signaling that there is nothing to install.
pub fn detect(project: &Path) -> Option<PackageManagerInfo> {
    for kind in PackageManagerKind::DETECTION_ORDER {
        if project.join(kind.lockfile()).is_file() {
            return Some(PackageManagerInfo {
                kind,
                source: DetectionSource::Lockfile(kind.lockfile()),
            });
        }
    }

    if project.join("package.json").is_file() {
        return Some(PackageManagerInfo {
            kind: PackageManagerKind::Npm,
            source: DetectionSource::ManifestDefault,
        });
    }

    None
}

/// Detect the package manager honoring a configured preference.
///
/// An explicit preference wins over lockfile detection as long as the
/// project has a manifest; `auto` defers to [`detect`].
pub fn select(project: &Path, choice: PackageManagerChoice) -> Option<PackageManagerInfo> {
    let kind = match choice {
        PackageManagerChoice::Auto => return detect(project),
        PackageManagerChoice::Bun => PackageManagerKind::Bun,
        PackageManagerChoice::Pnpm => PackageManagerKind::Pnpm,
        PackageManagerChoice::Yarn => PackageManagerKind::Yarn,
        PackageManagerChoice::Npm => PackageManagerKind::Npm,
    };

    if !project.join("package.json").is_file() {
        return None;
    }

    Some(PackageManagerInfo {
        kind,
        source: DetectionSource::Configured,
    })
}

/// Shells out to the detected package manager's install command
pub struct DependencyInstaller {
    runner: Arc<dyn CommandRunner>,
}

impl DependencyInstaller {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Run `<tool> install` in `path`.
    ///
    /// Returns `false` on any failure (tool missing, non-zero exit) so the
    /// caller can continue without dependencies installed.
    pub async fn install(&self, path: &Path, info: &PackageManagerInfo) -> bool {
        let tool = info.kind.command();

        match self.runner.run("which", &[tool], None).await {
            Ok(output) if output.success() => {}
            _ => {
                warn!("Package manager '{tool}' is not installed; skipping dependency install");
                return false;
            }
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("Installing dependencies with {tool}..."));
        spinner.enable_steady_tick(Duration::from_millis(100));

        let result = self.runner.run(tool, &["install"], Some(path)).await;
        spinner.finish_and_clear();

        match result {
            Ok(output) if output.success() => {
                debug!("Installed dependencies with {tool} in {}", path.display());
                true
            }
            Ok(output) => {
                warn!(
                    "'{tool} install' exited with status {}: {}",
                    output.status,
                    output.stderr.trim()
                );
                false
            }
            Err(err) => {
                warn!("Failed to run '{tool} install': {err:#}");
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

    fn project_with(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            fs::write(dir.path().join(file), "{}").unwrap();
        }
        dir
    }

    #[test]
    fn test_lockfile_precedence_bun_over_pnpm() {
        let dir = project_with(&["package.json", "bun.lockb", "pnpm-lock.yaml"]);
        let info = detect(dir.path()).unwrap();
        assert_eq!(info.kind, PackageManagerKind::Bun);
        assert_eq!(info.source, DetectionSource::Lockfile("bun.lockb"));
    }

    #[test]
    fn test_lockfile_precedence_is_total() {
        let dir = project_with(&["package.json", "yarn.lock", "package-lock.json"]);
        assert_eq!(detect(dir.path()).unwrap().kind, PackageManagerKind::Yarn);

        let dir = project_with(&["package.json", "package-lock.json"]);
        assert_eq!(detect(dir.path()).unwrap().kind, PackageManagerKind::Npm);
    }

    #[test]
    fn test_manifest_without_lockfile_defaults_to_npm() {
        let dir = project_with(&["package.json"]);
        let info = detect(dir.path()).unwrap();
        assert_eq!(info.kind, PackageManagerKind::Npm);
        assert_eq!(info.source, DetectionSource::ManifestDefault);
    }

    #[test]
    fn test_no_manifest_means_nothing_to_install() {
        let dir = TempDir::new().unwrap();
        assert!(detect(dir.path()).is_none());
    }

    #[test]
    fn test_configured_preference_wins_over_lockfile() {
        let dir = project_with(&["package.json", "package-lock.json"]);
        let info = select(dir.path(), PackageManagerChoice::Pnpm).unwrap();
        assert_eq!(info.kind, PackageManagerKind::Pnpm);
        assert_eq!(info.source, DetectionSource::Configured);
    }

    #[tokio::test]
    async fn test_install_returns_false_on_nonzero_exit() {
        let dir = project_with(&["package.json"]);
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("which", &["npm"], CommandOutput::ok("/usr/bin/npm"));
        runner.respond("npm", &["install"], CommandOutput::failed(1, "ERESOLVE"));

        let installer = DependencyInstaller::new(runner);
        let info = detect(dir.path()).unwrap();
        assert!(!installer.install(dir.path(), &info).await);
    }

    #[tokio::test]
    async fn test_install_returns_false_when_tool_missing() {
        let dir = project_with(&["package.json"]);
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("which", &["npm"], CommandOutput::failed(1, ""));

        let installer = DependencyInstaller::new(runner.clone());
        let info = detect(dir.path()).unwrap();
        assert!(!installer.install(dir.path(), &info).await);
        assert_eq!(runner.call_count("npm install"), 0);
    }

    #[tokio::test]
    async fn test_install_success() {
        let dir = project_with(&["package.json", "pnpm-lock.yaml"]);
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("which", &["pnpm"], CommandOutput::ok("/usr/bin/pnpm"));
        runner.respond("pnpm", &["install"], CommandOutput::ok("done"));

        let installer = DependencyInstaller::new(runner.clone());
        let info = detect(dir.path()).unwrap();
        assert!(installer.install(dir.path(), &info).await);
        assert_eq!(runner.call_count("pnpm install"), 1);
    }
}

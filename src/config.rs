//! Configuration loading, profile overlays, and CLI overrides
//!
//! Resolution order, lowest to highest precedence: base file, optional
//! named profile, individual CLI flags. Only the base file is mandatory;
//! every field has a default so a partial profile or flag set never leaves
//! the configuration partially undefined.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::pkg::PackageManagerChoice;
use crate::terminal::TerminalApp;
use crate::util::expand_tilde;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {path}. Run 'grove config init' to create it.")]
    Missing { path: PathBuf },

    #[error("Failed to read configuration file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    Invalid {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Issue tracker and AI integration flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationConfig {
    /// Fetch issue metadata from the issue tracker CLI
    pub auto_fetch_issues: bool,

    /// Ask the AI CLI for a branch name before falling back to the slug
    pub ai_branch_names: bool,

    /// Start the seeded AI session in plan mode
    pub ai_plan_mode: bool,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            auto_fetch_issues: true,
            ai_branch_names: false,
            ai_plan_mode: false,
        }
    }
}

/// Cleanup policy for `grove clean`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanupPolicy {
    /// Also clean worktrees whose branch is merged into the default branch
    pub auto_clean_merged: bool,

    /// Forced cleanup only removes worktrees older than this many days
    pub max_age_days: u64,

    /// Number of most recent worktrees always kept during forced cleanup
    pub keep_recent: usize,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            auto_clean_merged: false,
            max_age_days: 30,
            keep_recent: 3,
        }
    }
}

/// Effective configuration for one invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    /// Base directory under which worktrees are created
    pub base_path: PathBuf,

    /// Branch worktrees are created from when none is given
    pub default_branch: String,

    /// Install dependencies in the new worktree
    pub auto_install_deps: bool,

    pub package_manager: PackageManagerChoice,

    /// Replicate .env* files from the source repository
    pub copy_env_files: bool,

    /// Open a terminal with a seeded AI session after creation
    pub open_terminal: bool,

    pub terminal_app: TerminalApp,

    /// External script invoked as `<script> <app-id> <command>`
    pub launcher_script: PathBuf,

    pub integrations: IntegrationConfig,

    pub cleanup: CleanupPolicy,

    /// Debug logging toggle, threaded from the CLI rather than global state
    #[serde(skip)]
    pub debug: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("~/worktrees"),
            default_branch: "main".to_string(),
            auto_install_deps: true,
            package_manager: PackageManagerChoice::Auto,
            copy_env_files: true,
            open_terminal: true,
            terminal_app: TerminalApp::Terminal,
            launcher_script: PathBuf::from("~/.grove/open-terminal.sh"),
            integrations: IntegrationConfig::default(),
            cleanup: CleanupPolicy::default(),
            debug: false,
        }
    }
}

/// Partial configuration used for profile overlays
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigurationOverlay {
    pub base_path: Option<PathBuf>,
    pub default_branch: Option<String>,
    pub auto_install_deps: Option<bool>,
    pub package_manager: Option<PackageManagerChoice>,
    pub copy_env_files: Option<bool>,
    pub open_terminal: Option<bool>,
    pub terminal_app: Option<TerminalApp>,
    pub launcher_script: Option<PathBuf>,
    pub integrations: Option<IntegrationOverlay>,
    pub cleanup: Option<CleanupOverlay>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationOverlay {
    pub auto_fetch_issues: Option<bool>,
    pub ai_branch_names: Option<bool>,
    pub ai_plan_mode: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanupOverlay {
    pub auto_clean_merged: Option<bool>,
    pub max_age_days: Option<u64>,
    pub keep_recent: Option<usize>,
}

/// Flags supplied on the command line; only explicitly set flags override
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output: Option<PathBuf>,
    pub profile: Option<String>,
    pub terminal: Option<String>,
    pub no_deps: bool,
    pub no_terminal: bool,
    pub debug: bool,
}

impl Configuration {
    /// Directory holding the base file, profiles, and history
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".grove")
    }

    pub fn base_file() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    pub fn profiles_dir() -> PathBuf {
        Self::config_dir().join("profiles")
    }

    pub fn history_file() -> PathBuf {
        Self::config_dir().join("history.json")
    }

    /// Resolve the effective configuration from the default file locations
    pub fn resolve(overrides: &CliOverrides) -> Result<Self, ConfigError> {
        Self::resolve_from(&Self::base_file(), &Self::profiles_dir(), overrides)
    }

    /// Resolve from explicit paths; the entry point for tests
    pub fn resolve_from(
        base_file: &Path,
        profiles_dir: &Path,
        overrides: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_base(base_file)?;

        if let Some(name) = &overrides.profile {
            let profile_path = profiles_dir.join(format!("{name}.json"));
            match Self::load_overlay(&profile_path) {
                Some(overlay) => {
                    debug!("Applying profile '{name}' from {}", profile_path.display());
                    config.apply_overlay(overlay);
                }
                None => {
                    warn!(
                        "Profile '{name}' not found at {}; continuing without it",
                        profile_path.display()
                    );
                }
            }
        }

        config.apply_cli(overrides);
        config.base_path = expand_tilde(&config.base_path);
        config.launcher_script = expand_tilde(&config.launcher_script);
        Ok(config)
    }

    fn load_base(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    fn load_overlay(path: &Path) -> Option<ConfigurationOverlay> {
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(err) => {
                warn!("Ignoring unparsable profile {}: {err}", path.display());
                None
            }
        }
    }

    fn apply_overlay(&mut self, overlay: ConfigurationOverlay) {
        if let Some(value) = overlay.base_path {
            self.base_path = value;
        }
        if let Some(value) = overlay.default_branch {
            self.default_branch = value;
        }
        if let Some(value) = overlay.auto_install_deps {
            self.auto_install_deps = value;
        }
        if let Some(value) = overlay.package_manager {
            self.package_manager = value;
        }
        if let Some(value) = overlay.copy_env_files {
            self.copy_env_files = value;
        }
        if let Some(value) = overlay.open_terminal {
            self.open_terminal = value;
        }
        if let Some(value) = overlay.terminal_app {
            self.terminal_app = value;
        }
        if let Some(value) = overlay.launcher_script {
            self.launcher_script = value;
        }
        if let Some(integrations) = overlay.integrations {
            if let Some(value) = integrations.auto_fetch_issues {
                self.integrations.auto_fetch_issues = value;
            }
            if let Some(value) = integrations.ai_branch_names {
                self.integrations.ai_branch_names = value;
            }
            if let Some(value) = integrations.ai_plan_mode {
                self.integrations.ai_plan_mode = value;
            }
        }
        if let Some(cleanup) = overlay.cleanup {
            if let Some(value) = cleanup.auto_clean_merged {
                self.cleanup.auto_clean_merged = value;
            }
            if let Some(value) = cleanup.max_age_days {
                self.cleanup.max_age_days = value;
            }
            if let Some(value) = cleanup.keep_recent {
                self.cleanup.keep_recent = value;
            }
        }
    }

    fn apply_cli(&mut self, overrides: &CliOverrides) {
        if let Some(output) = &overrides.output {
            self.base_path = output.clone();
        }

        if let Some(terminal) = &overrides.terminal {
            match terminal.parse::<TerminalApp>() {
                Ok(app) => self.terminal_app = app,
                Err(err) => warn!("Ignoring --terminal override: {err}"),
            }
        }

        if overrides.no_deps {
            self.auto_install_deps = false;
        }
        if overrides.no_terminal {
            self.open_terminal = false;
        }
        self.debug = overrides.debug;
    }

    /// Write the default base configuration file.
    ///
    /// Refuses to overwrite an existing file unless `force` is set.
    pub fn write_default_file(path: &Path, force: bool) -> anyhow::Result<()> {
        use anyhow::Context;

        if path.exists() && !force {
            anyhow::bail!(
                "Configuration file already exists at {}. Use --force to overwrite.",
                path.display()
            );
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(&Configuration::default())?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write configuration to {}", path.display()))?;
        Ok(())
    }
}

//! End-to-end worktree orchestration
//!
//! Sequences the create, list, and clean flows. A create is fatal only
//! while validating the repository, fetching the issue, or creating the
//! worktree itself; every later step is best-effort because the worktree
//! already exists and partial automation beats rollback.

use chrono::{Duration, Utc};
use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::branch::{heuristic_branch_name, BranchNamer};
use crate::config::Configuration;
use crate::envfiles::copy_env_files;
use crate::git::{GitOps, WorktreeRecord};
use crate::history::{HistoryRecord, HistoryStore};
use crate::issue::{parse_issue_url, IssueFetcher, IssueMetadata};
use crate::pkg::{self, DependencyInstaller};
use crate::process::CommandRunner;
use crate::terminal::{TerminalApp, TerminalLauncher};
use crate::util::shell_quote;

/// Inputs for one create operation
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub issue_url: String,
    /// Explicit branch name, bypassing both naming paths
    pub branch_override: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationMetadata {
    pub issue_url: String,
    pub issue_number: u64,
    pub repository: String,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeCreationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CreationMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorktreeCreationResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            path: None,
            branch: None,
            metadata: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub success: bool,
    pub removed: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub cleaned: usize,
}

impl CleanupResult {
    /// The only constructor, so `cleaned == removed.len()` and
    /// `success == errors.is_empty()` hold for every result.
    pub fn from_outcomes(removed: Vec<PathBuf>, errors: Vec<String>) -> Self {
        Self {
            success: errors.is_empty(),
            cleaned: removed.len(),
            removed,
            errors,
        }
    }
}

/// Orchestrates worktree creation, listing, and cleanup
pub struct WorktreeManager {
    config: Configuration,
    runner: Arc<dyn CommandRunner>,
    workspace_dir: PathBuf,
    history: HistoryStore,
}

impl WorktreeManager {
    pub fn new(config: Configuration, runner: Arc<dyn CommandRunner>, workspace_dir: PathBuf) -> Self {
        let history = HistoryStore::new(Configuration::history_file());
        Self::with_history(config, runner, workspace_dir, history)
    }

    pub fn with_history(
        config: Configuration,
        runner: Arc<dyn CommandRunner>,
        workspace_dir: PathBuf,
        history: HistoryStore,
    ) -> Self {
        Self {
            config,
            runner,
            workspace_dir,
            history,
        }
    }

    /// Create a worktree from an issue URL.
    ///
    /// Failures before and during worktree creation abort; everything after
    /// is logged and skipped.
    pub async fn create(&self, request: CreateRequest) -> WorktreeCreationResult {
        // ValidatingRepo
        if !GitOps::is_repository(self.runner.as_ref(), &self.workspace_dir).await {
            return WorktreeCreationResult::failed(format!(
                "{} is not inside a git repository; run grove from the repository you want to branch",
                self.workspace_dir.display()
            ));
        }

        let git = match GitOps::discover(self.runner.clone(), &self.workspace_dir).await {
            Ok(git) => git,
            Err(err) => return WorktreeCreationResult::failed(format!("{err:#}")),
        };

        // FetchingIssue
        let issue = match self.resolve_issue(&request.issue_url).await {
            Some(issue) => issue,
            None => {
                return WorktreeCreationResult::failed(format!(
                    "Could not resolve issue metadata from {}",
                    request.issue_url
                ));
            }
        };
        println!(
            "{} Issue #{}: {}",
            style("→").dim(),
            style(issue.number).cyan(),
            style(&issue.title).bold()
        );

        // NamingBranch
        let branch = self.resolve_branch_name(&request, &issue).await;

        // CreatingWorktree
        let worktree_path = self
            .config
            .base_path
            .join(format!("{}-worktree", git.repo_name()))
            .join(&branch);

        if let Err(err) = git.create_worktree(&worktree_path, &branch, None).await {
            return WorktreeCreationResult::failed(format!("{err:#}"));
        }
        println!(
            "{} Created worktree {} on branch {}",
            style("✓").green().bold(),
            style(worktree_path.display()).cyan(),
            style(&branch).cyan()
        );

        // CopyingEnv (best-effort)
        if self.config.copy_env_files {
            let copied = copy_env_files(git.repo_root(), &worktree_path);
            if copied > 0 {
                println!(
                    "{} Copied {} environment file(s)",
                    style("✓").green().bold(),
                    copied
                );
            }
        }

        // InstallingDeps (best-effort)
        if self.config.auto_install_deps {
            match pkg::select(&worktree_path, self.config.package_manager) {
                Some(pm) => {
                    let installer = DependencyInstaller::new(self.runner.clone());
                    if installer.install(&worktree_path, &pm).await {
                        println!(
                            "{} Installed dependencies with {}",
                            style("✓").green().bold(),
                            pm.kind.command()
                        );
                    } else {
                        println!(
                            "{} Dependency install failed; continuing without dependencies",
                            style("⚠").yellow()
                        );
                    }
                }
                None => debug!("No package manifest found; nothing to install"),
            }
        }

        // LaunchingTerminal (best-effort)
        if self.config.open_terminal {
            self.launch_terminal(&issue, &worktree_path).await;
        }

        // RecordingHistory (best-effort)
        let created_at = Utc::now();
        let record = HistoryRecord {
            path: worktree_path.clone(),
            created_at,
            branch_name: branch.clone(),
            issue_url: issue.url.clone(),
            issue_number: issue.number,
            repository: git.repo_name(),
        };
        if let Err(err) = self.history.append(record) {
            warn!("Could not record worktree in history: {err:#}");
        }

        WorktreeCreationResult {
            success: true,
            path: Some(worktree_path),
            branch: Some(branch),
            metadata: Some(CreationMetadata {
                issue_url: issue.url,
                issue_number: issue.number,
                repository: git.repo_name(),
                created_at,
            }),
            error: None,
        }
    }

    /// List live worktrees, joining issue URLs from the creation history
    pub async fn list(&self) -> anyhow::Result<Vec<WorktreeRecord>> {
        let git = GitOps::discover(self.runner.clone(), &self.workspace_dir).await?;
        let mut records = git.list_worktrees().await?;

        for record in &mut records {
            if let Some(entry) = self.history.find_by_path(&record.path) {
                record.issue_url = Some(entry.issue_url);
            }
        }

        Ok(records)
    }

    /// Remove prunable worktrees, or all non-primary worktrees with `force`.
    ///
    /// The configured cleanup policy additionally selects merged and stale
    /// worktrees, always retaining the most recent ones. Per-item failures
    /// are collected, never propagated.
    pub async fn clean(&self, force: bool) -> CleanupResult {
        let git = match GitOps::discover(self.runner.clone(), &self.workspace_dir).await {
            Ok(git) => git,
            Err(err) => return CleanupResult::from_outcomes(Vec::new(), vec![format!("{err:#}")]),
        };

        let worktrees = match git.list_worktrees().await {
            Ok(worktrees) => worktrees,
            Err(err) => return CleanupResult::from_outcomes(Vec::new(), vec![format!("{err:#}")]),
        };

        let repo_root = git.repo_root().to_path_buf();
        let merged = if self.config.cleanup.auto_clean_merged {
            let target = git.default_branch().await;
            git.merged_branches(&target).await
        } else {
            Vec::new()
        };

        let mut targets: Vec<WorktreeRecord> = Vec::new();
        let mut policy_candidates: Vec<WorktreeRecord> = Vec::new();
        let stale_cutoff = Utc::now() - Duration::days(self.config.cleanup.max_age_days as i64);

        for worktree in worktrees {
            if worktree.path == repo_root {
                continue; // never touch the primary worktree
            }
            if worktree.prunable || force {
                targets.push(worktree);
                continue;
            }

            let is_merged = merged.contains(&worktree.branch);
            let is_stale = worktree
                .created_at
                .map(|created| created < stale_cutoff)
                .unwrap_or(false);
            if is_merged || is_stale {
                policy_candidates.push(worktree);
            }
        }

        // The newest policy-selected worktrees are always retained
        policy_candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        targets.extend(
            policy_candidates
                .into_iter()
                .skip(self.config.cleanup.keep_recent),
        );

        let mut removed = Vec::new();
        let mut errors = Vec::new();
        for worktree in targets {
            info!("Removing worktree {}", worktree.path.display());
            match git.remove_worktree(&worktree.path, true).await {
                Ok(()) => {
                    git.delete_branch(&worktree.branch).await;
                    removed.push(worktree.path);
                }
                Err(err) => errors.push(format!("{}: {err:#}", worktree.path.display())),
            }
        }

        git.prune_worktrees().await;
        CleanupResult::from_outcomes(removed, errors)
    }

    async fn resolve_issue(&self, url: &str) -> Option<IssueMetadata> {
        if self.config.integrations.auto_fetch_issues {
            let fetcher = IssueFetcher::new(self.runner.clone());
            return fetcher.fetch_issue(url).await;
        }

        // Fetching disabled: fall back to what the URL alone tells us
        let reference = parse_issue_url(url)?;
        info!(
            "Issue fetching disabled; using issue #{} without metadata",
            reference.number
        );
        Some(IssueMetadata {
            number: reference.number,
            title: String::new(),
            body: String::new(),
            state: String::new(),
            url: url.trim().to_string(),
            labels: Vec::new(),
            assignees: Vec::new(),
            owner: reference.owner,
            repo: reference.repo,
        })
    }

    async fn resolve_branch_name(&self, request: &CreateRequest, issue: &IssueMetadata) -> String {
        if let Some(branch) = &request.branch_override {
            debug!("Using branch name from --branch: {branch}");
            return branch.clone();
        }

        if self.config.integrations.ai_branch_names {
            let namer = BranchNamer::new(self.runner.clone());
            return namer.assistant_branch_name(issue).await.value;
        }

        heuristic_branch_name(issue)
    }

    async fn launch_terminal(&self, issue: &IssueMetadata, worktree_path: &Path) {
        let launcher = TerminalLauncher::new(
            self.runner.clone(),
            self.config.launcher_script.clone(),
        );

        let mut app = self.config.terminal_app;
        if !launcher.is_installed(app).await {
            warn!(
                "{} is not installed; falling back to the native terminal",
                app.app_name()
            );
            app = TerminalApp::Terminal;
        }

        let command = seeded_assistant_command(issue, self.config.integrations.ai_plan_mode);
        if self.config.debug {
            println!("  {} launcher command: {}", style("·").dim(), command);
        }
        if launcher.launch(app, worktree_path, &command).await {
            println!(
                "{} Opened {} with a seeded session",
                style("✓").green().bold(),
                app.app_name()
            );
        } else {
            println!(
                "{} Could not open a terminal; the worktree is ready at {}",
                style("⚠").yellow(),
                worktree_path.display()
            );
        }
    }
}

/// Shell command that starts the AI assistant seeded with issue context
fn seeded_assistant_command(issue: &IssueMetadata, plan_mode: bool) -> String {
    let title = if issue.title.is_empty() {
        "(no title)".to_string()
    } else {
        issue.title.clone()
    };
    let prompt = format!(
        "Work on GitHub issue #{}: {}. Issue URL: {}. \
         Read the issue with the GitHub CLI, then outline and implement a fix.",
        issue.number, title, issue.url
    );

    let mut command = String::from("claude");
    if plan_mode {
        command.push_str(" --permission-mode plan");
    }
    command.push(' ');
    command.push_str(&shell_quote(&prompt));
    command
}

//! Git operations adapter
//!
//! Wraps the git CLI for worktree listing, creation, and removal. Creation
//! is idempotent-by-destruction: a stale worktree at the target path is
//! forcibly removed before the new one is added, trading data safety for
//! automation convenience. Removal falls back to a raw recursive delete
//! when the native command fails.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::process::CommandRunner;

/// A worktree as reported by the git registry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeRecord {
    pub path: PathBuf,
    pub branch: String,
    pub head: String,
    pub locked: bool,
    pub prunable: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub last_accessed: Option<DateTime<Utc>>,
    /// Joined from the history file; git itself knows nothing about issues
    pub issue_url: Option<String>,
}

/// Git CLI adapter rooted at a repository
#[derive(Clone)]
pub struct GitOps {
    repo_root: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl GitOps {
    pub fn new(repo_root: PathBuf, runner: Arc<dyn CommandRunner>) -> Self {
        Self { repo_root, runner }
    }

    /// Check whether `path` is inside a git repository.
    ///
    /// Any failure, including git being absent, is reported as `false`.
    pub async fn is_repository(runner: &dyn CommandRunner, path: &Path) -> bool {
        match runner
            .run("git", &["rev-parse", "--is-inside-work-tree"], Some(path))
            .await
        {
            Ok(output) => output.success() && output.stdout.trim() == "true",
            Err(_) => false,
        }
    }

    /// Build an adapter rooted at the repository containing `path`
    pub async fn discover(runner: Arc<dyn CommandRunner>, path: &Path) -> Result<Self> {
        let output = runner
            .run("git", &["rev-parse", "--show-toplevel"], Some(path))
            .await
            .context("Failed to run git")?;

        if !output.success() {
            bail!(
                "Not inside a git repository: {} ({})",
                path.display(),
                output.stderr.trim()
            );
        }

        let root = PathBuf::from(output.stdout.trim());
        Ok(Self::new(root, runner))
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Repository name derived from the root directory
    pub fn repo_name(&self) -> String {
        self.repo_root
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "repository".to_string())
    }

    pub async fn current_branch(&self) -> Result<String> {
        let output = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(output.trim().to_string())
    }

    /// Resolve the remote's default branch, falling back to `main`
    pub async fn default_branch(&self) -> String {
        match self
            .git(&["symbolic-ref", "refs/remotes/origin/HEAD", "--short"])
            .await
        {
            Ok(output) => {
                let name = output
                    .trim()
                    .strip_prefix("origin/")
                    .unwrap_or(output.trim())
                    .to_string();
                if name.is_empty() {
                    "main".to_string()
                } else {
                    name
                }
            }
            Err(err) => {
                debug!("Could not resolve origin/HEAD ({err:#}); assuming 'main'");
                "main".to_string()
            }
        }
    }

    /// List registered worktrees from the porcelain output.
    ///
    /// Entries missing a path, branch, or head commit are dropped rather
    /// than surfaced as errors.
    pub async fn list_worktrees(&self) -> Result<Vec<WorktreeRecord>> {
        let output = self.git(&["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_porcelain(&output))
    }

    /// Create a worktree with a new branch at `path`.
    ///
    /// A pre-existing worktree at the same path is forcibly removed first,
    /// discarding whatever it contained. Failure of the creation command
    /// itself propagates.
    pub async fn create_worktree(
        &self,
        path: &Path,
        branch: &str,
        base_branch: Option<&str>,
    ) -> Result<()> {
        validate_branch_name(branch)?;

        let registered = self
            .list_worktrees()
            .await
            .unwrap_or_default()
            .into_iter()
            .any(|worktree| worktree.path == path);

        if registered || path.exists() {
            warn!(
                "Removing existing worktree at {} before recreating it",
                path.display()
            );
            self.remove_worktree(path, true).await.ok();
            self.prune_worktrees().await;
        }

        // A branch left over from a previous run would make `worktree add -b` fail
        self.delete_branch(branch).await;

        let base = match base_branch {
            Some(base) => base.to_string(),
            None => self.default_branch().await,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create worktree parent directory: {}", parent.display())
            })?;
        }

        let path_str = path.to_string_lossy();
        self.git(&["worktree", "add", "-b", branch, &path_str, &base])
            .await
            .with_context(|| format!("Failed to create worktree at {}", path.display()))?;

        debug!("Created worktree {} -> {}", branch, path.display());
        Ok(())
    }

    /// Remove a worktree, falling back to a raw directory delete.
    ///
    /// The fallback swallows its own errors; `Err` is returned only when
    /// the native removal failed and the directory is still on disk
    /// afterwards.
    pub async fn remove_worktree(&self, path: &Path, force: bool) -> Result<()> {
        let path_str = path.to_string_lossy().to_string();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);

        match self.git(&args).await {
            Ok(_) => {
                debug!("Removed worktree: {}", path.display());
                Ok(())
            }
            Err(err) => {
                warn!("Native worktree removal failed ({err:#}); trying raw delete");
                if path.exists() {
                    fs::remove_dir_all(path).ok();
                }
                if path.exists() {
                    bail!("Failed to remove worktree at {}", path.display());
                }
                Ok(())
            }
        }
    }

    /// Prune stale registry entries; best-effort
    pub async fn prune_worktrees(&self) {
        if let Err(err) = self.git(&["worktree", "prune"]).await {
            warn!("Failed to prune worktrees: {err:#}");
        }
    }

    /// Delete a local branch; best-effort
    pub async fn delete_branch(&self, branch: &str) {
        if self.git(&["branch", "-D", branch]).await.is_ok() {
            debug!("Deleted branch: {branch}");
        }
    }

    /// Branches fully merged into `target`, as reported by git
    pub async fn merged_branches(&self, target: &str) -> Vec<String> {
        match self
            .git(&["branch", "--merged", target, "--format", "%(refname:short)"])
            .await
        {
            Ok(output) => output
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && *line != target)
                .map(str::to_string)
                .collect(),
            Err(err) => {
                debug!("Could not list merged branches: {err:#}");
                Vec::new()
            }
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = self
            .runner
            .run("git", args, Some(&self.repo_root))
            .await
            .with_context(|| format!("Failed to execute git command: git {}", args.join(" ")))?;

        if !output.success() {
            bail!(
                "Git command failed: git {}\nError: {}",
                args.join(" "),
                output.stderr.trim()
            );
        }

        Ok(output.stdout)
    }
}

/// Parse `git worktree list --porcelain` output.
///
/// Detached and bare entries carry no branch and are dropped along with any
/// entry missing a path or head commit.
pub fn parse_worktree_porcelain(output: &str) -> Vec<WorktreeRecord> {
    let mut records = Vec::new();
    let mut current: Option<WorktreeRecord> = None;

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("worktree ") {
            push_if_complete(&mut records, current.take());
            let path = PathBuf::from(rest);
            let (created_at, last_accessed) = path_timestamps(&path);
            current = Some(WorktreeRecord {
                path,
                branch: String::new(),
                head: String::new(),
                locked: false,
                prunable: false,
                created_at,
                last_accessed,
                issue_url: None,
            });
        } else if let Some(record) = current.as_mut() {
            if let Some(head) = line.strip_prefix("HEAD ") {
                record.head = head.to_string();
            } else if let Some(branch_ref) = line.strip_prefix("branch ") {
                record.branch = branch_ref
                    .strip_prefix("refs/heads/")
                    .unwrap_or(branch_ref)
                    .to_string();
            } else if line == "locked" || line.starts_with("locked ") {
                record.locked = true;
            } else if line == "prunable" || line.starts_with("prunable ") {
                record.prunable = true;
            }
        }
    }

    push_if_complete(&mut records, current.take());
    records
}

fn push_if_complete(records: &mut Vec<WorktreeRecord>, record: Option<WorktreeRecord>) {
    if let Some(record) = record {
        let complete = !record.path.as_os_str().is_empty()
            && !record.branch.is_empty()
            && !record.head.is_empty();
        if complete {
            records.push(record);
        }
    }
}

fn path_timestamps(path: &Path) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match fs::metadata(path) {
        Ok(metadata) => {
            let created = metadata.created().ok().map(DateTime::<Utc>::from);
            let accessed = metadata.accessed().ok().map(DateTime::<Utc>::from);
            (created, accessed)
        }
        Err(_) => (None, None),
    }
}

/// Validate a git branch name for security and compatibility
pub fn validate_branch_name(branch_name: &str) -> Result<()> {
    if branch_name.is_empty() {
        bail!("Branch name cannot be empty");
    }

    let dangerous_chars = [
        '$', '`', '(', ')', '{', '}', '|', '&', ';', '<', '>', '\n', '\r', '\0', '"', '\'', '\\',
        ' ',
    ];
    if branch_name.chars().any(|c| dangerous_chars.contains(&c)) {
        bail!("Branch name contains invalid characters");
    }

    if branch_name.starts_with('.') || branch_name.ends_with('.') {
        bail!("Branch name cannot start or end with a dot");
    }

    if branch_name.starts_with('/') || branch_name.ends_with('/') {
        bail!("Branch name cannot start or end with a slash");
    }

    if branch_name.contains("..") {
        bail!("Branch name cannot contain consecutive dots");
    }

    if branch_name.contains("@{") {
        bail!("Branch name cannot contain '@{{' sequence");
    }

    if branch_name.len() > 255 {
        bail!("Branch name too long (max 255 characters)");
    }

    Ok(())
}

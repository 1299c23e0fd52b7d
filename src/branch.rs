//! Branch name derivation from issue metadata
//!
//! Two paths: a deterministic slug transform, and an AI-assisted name that
//! falls back to the slug on any failure. The fallback is a hard guarantee;
//! branch naming can never fail the creation flow.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::issue::IssueMetadata;
use crate::process::CommandRunner;

const MAX_SLUG_LEN: usize = 50;
const MAX_BODY_CONTEXT: usize = 500;

static NON_SLUG_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").expect("slug pattern is valid"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));
static HYPHEN_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-{2,}").expect("hyphen pattern is valid"));

/// Which naming path produced a branch name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingSource {
    Assistant,
    Heuristic,
}

/// A derived branch name tagged with its origin, collapsed to a plain
/// string at the public boundary
#[derive(Debug, Clone)]
pub struct NamedBranch {
    pub via: NamingSource,
    pub value: String,
}

/// Deterministic slug-based branch name: `issue-<number>-<title-slug>`
pub fn heuristic_branch_name(issue: &IssueMetadata) -> String {
    let slug = slugify_title(&issue.title);
    if slug.is_empty() {
        format!("issue-{}", issue.number)
    } else {
        format!("issue-{}-{}", issue.number, slug)
    }
}

fn slugify_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = NON_SLUG_CHARS.replace_all(&lowered, "");
    let hyphenated = WHITESPACE_RUN.replace_all(stripped.trim(), "-");
    let collapsed = HYPHEN_RUN.replace_all(&hyphenated, "-");

    let trimmed = collapsed.trim_matches('-');
    let truncated: String = trimmed.chars().take(MAX_SLUG_LEN).collect();
    truncated.trim_matches('-').to_string()
}

/// Derives branch names, preferring the AI CLI when enabled
pub struct BranchNamer {
    runner: Arc<dyn CommandRunner>,
}

impl BranchNamer {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Ask the AI CLI for a branch name, falling back to the heuristic.
    ///
    /// Never fails: a missing CLI, non-JSON output, or an unusable name all
    /// degrade to the deterministic slug with a logged reason.
    pub async fn assistant_branch_name(&self, issue: &IssueMetadata) -> NamedBranch {
        match self.try_assistant(issue).await {
            Ok(value) => {
                debug!("AI-assisted branch name: {value}");
                NamedBranch {
                    via: NamingSource::Assistant,
                    value,
                }
            }
            Err(err) => {
                warn!("AI branch naming unavailable ({err:#}); using heuristic name");
                NamedBranch {
                    via: NamingSource::Heuristic,
                    value: heuristic_branch_name(issue),
                }
            }
        }
    }

    async fn try_assistant(&self, issue: &IssueMetadata) -> Result<String> {
        let prompt = assistant_prompt(issue);
        let output = self
            .runner
            .run("claude", &["-p", &prompt, "--output-format", "json"], None)
            .await
            .context("failed to run the AI CLI")?;

        if !output.success() {
            bail!("AI CLI exited with status {}", output.status);
        }

        let value: serde_json::Value = serde_json::from_str(output.stdout.trim())
            .context("AI CLI did not return JSON")?;
        let result = value
            .get("result")
            .and_then(|result| result.as_str())
            .context("AI response is missing the 'result' field")?;

        normalize_assistant_name(result)
    }
}

fn assistant_prompt(issue: &IssueMetadata) -> String {
    let body: String = issue.body.chars().take(MAX_BODY_CONTEXT).collect();
    format!(
        "Suggest a git branch name for GitHub issue #{number}: \"{title}\".\n\n\
         Issue body (may be truncated):\n{body}\n\n\
         Rules:\n\
         - kebab-case, lowercase letters, digits, and hyphens only\n\
         - at most 50 characters\n\
         - start with 'issue-{number}-'\n\
         - respond with the branch name only, no commentary",
        number = issue.number,
        title = issue.title,
        body = body,
    )
}

fn normalize_assistant_name(raw: &str) -> Result<String> {
    let candidate = raw
        .lines()
        .map(|line| line.trim().trim_matches('`').trim_matches('"'))
        .find(|line| !line.is_empty())
        .unwrap_or("");

    if candidate.is_empty() {
        bail!("AI returned an empty branch name");
    }

    if candidate.chars().count() > MAX_SLUG_LEN {
        bail!("AI returned an oversized branch name ({} chars)", candidate.len());
    }

    if !candidate
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!("AI returned a branch name with invalid characters: {candidate}");
    }

    Ok(candidate.trim_matches('-').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::testing::ScriptedRunner;

    fn issue(number: u64, title: &str) -> IssueMetadata {
        IssueMetadata {
            number,
            title: title.to_string(),
            body: "Some body text".to_string(),
            state: "OPEN".to_string(),
            url: format!("https://github.com/acme/widgets/issues/{number}"),
            labels: Vec::new(),
            assignees: Vec::new(),
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
        }
    }

    #[test]
    fn test_heuristic_slug() {
        let name = heuristic_branch_name(&issue(456, "Fix: Memory Leak in API!!"));
        assert_eq!(name, "issue-456-fix-memory-leak-in-api");
    }

    #[test]
    fn test_heuristic_collapses_whitespace_and_hyphens() {
        let name = heuristic_branch_name(&issue(1, "  Add   --  OAuth support  "));
        assert_eq!(name, "issue-1-add-oauth-support");
    }

    #[test]
    fn test_heuristic_truncates_slug() {
        let long_title = "word ".repeat(30);
        let name = heuristic_branch_name(&issue(7, &long_title));
        let slug = name.strip_prefix("issue-7-").unwrap();
        assert!(slug.chars().count() <= 50);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_heuristic_empty_slug() {
        assert_eq!(heuristic_branch_name(&issue(9, "!!! ???")), "issue-9");
    }

    #[tokio::test]
    async fn test_assistant_success() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            "claude",
            &[],
            CommandOutput::ok(r#"{"result": "issue-42-fix-flux-capacitor"}"#),
        );

        let namer = BranchNamer::new(runner);
        let named = namer
            .assistant_branch_name(&issue(42, "Fix the flux capacitor"))
            .await;
        assert_eq!(named.via, NamingSource::Assistant);
        assert_eq!(named.value, "issue-42-fix-flux-capacitor");
    }

    #[tokio::test]
    async fn test_assistant_missing_cli_matches_heuristic() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_to_spawn("claude");

        let subject = issue(456, "Fix: Memory Leak in API!!");
        let namer = BranchNamer::new(runner);
        let named = namer.assistant_branch_name(&subject).await;

        assert_eq!(named.via, NamingSource::Heuristic);
        assert_eq!(named.value, heuristic_branch_name(&subject));
    }

    #[tokio::test]
    async fn test_assistant_non_json_falls_back() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("claude", &[], CommandOutput::ok("Sure! How about this:"));

        let subject = issue(3, "Add dark mode");
        let named = BranchNamer::new(runner).assistant_branch_name(&subject).await;
        assert_eq!(named.via, NamingSource::Heuristic);
        assert_eq!(named.value, "issue-3-add-dark-mode");
    }

    #[tokio::test]
    async fn test_assistant_oversized_result_falls_back() {
        let runner = Arc::new(ScriptedRunner::new());
        let oversized = format!(r#"{{"result": "{}"}}"#, "x".repeat(80));
        runner.respond("claude", &[], CommandOutput::ok(oversized));

        let subject = issue(3, "Add dark mode");
        let named = BranchNamer::new(runner).assistant_branch_name(&subject).await;
        assert_eq!(named.via, NamingSource::Heuristic);
    }

    #[tokio::test]
    async fn test_assistant_empty_result_falls_back() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("claude", &[], CommandOutput::ok(r#"{"result": ""}"#));

        let subject = issue(3, "Add dark mode");
        let named = BranchNamer::new(runner).assistant_branch_name(&subject).await;
        assert_eq!(named.via, NamingSource::Heuristic);
    }

    #[test]
    fn test_normalize_assistant_name_strips_fencing() {
        let name = normalize_assistant_name("```\nissue-1-fix\n```").unwrap();
        assert_eq!(name, "issue-1-fix");
    }
}

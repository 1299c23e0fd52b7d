//! GitHub issue URL parsing and metadata fetching
//!
//! Fetching goes through the GitHub CLI. Every failure mode (bad URL, gh
//! missing, not authenticated, fetch error) logs its own actionable
//! diagnostic and yields `None`; nothing here ever propagates an error to
//! the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::process::CommandRunner;

static ISSUE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[^/]+/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)/issues/(\d+)/?$")
        .expect("issue URL pattern is valid")
});

/// Owner, repository, and issue number parsed from an issue URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReference {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

/// Issue metadata as returned by the tracker
#[derive(Debug, Clone)]
pub struct IssueMetadata {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub url: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub owner: String,
    pub repo: String,
}

/// Parse an issue URL of the form `.../<owner>/<repo>/issues/<number>`.
///
/// Pure and I/O-free; any URL not matching the pattern yields `None`.
pub fn parse_issue_url(url: &str) -> Option<IssueReference> {
    let captures = ISSUE_URL_RE.captures(url.trim())?;
    let number = captures[3].parse().ok()?;
    Some(IssueReference {
        owner: captures[1].to_string(),
        repo: captures[2].to_string(),
        number,
    })
}

#[derive(Deserialize)]
struct RawIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    state: String,
    url: String,
    #[serde(default)]
    labels: Vec<RawLabel>,
    #[serde(default)]
    assignees: Vec<RawAssignee>,
}

#[derive(Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Deserialize)]
struct RawAssignee {
    login: String,
}

/// Fetches issues through the GitHub CLI
pub struct IssueFetcher {
    runner: Arc<dyn CommandRunner>,
}

impl IssueFetcher {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn is_installed(&self) -> bool {
        match self.runner.run("gh", &["--version"], None).await {
            Ok(output) => output.success(),
            Err(_) => false,
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        match self.runner.run("gh", &["auth", "status"], None).await {
            Ok(output) => output.success(),
            Err(_) => false,
        }
    }

    /// Fetch issue metadata, returning `None` on any failure.
    ///
    /// Installation and authentication are checked up front so the user
    /// gets an actionable message instead of an opaque fetch error.
    pub async fn fetch_issue(&self, url: &str) -> Option<IssueMetadata> {
        let reference = match parse_issue_url(url) {
            Some(reference) => reference,
            None => {
                warn!("'{url}' is not a recognized issue URL (expected .../owner/repo/issues/N)");
                return None;
            }
        };

        if !self.is_installed().await {
            warn!("GitHub CLI (gh) is not installed; install it from https://cli.github.com");
            return None;
        }

        if !self.is_authenticated().await {
            warn!("GitHub CLI is not authenticated; run 'gh auth login' first");
            return None;
        }

        let output = match self
            .runner
            .run(
                "gh",
                &[
                    "issue",
                    "view",
                    url,
                    "--json",
                    "number,title,body,state,url,labels,assignees",
                ],
                None,
            )
            .await
        {
            Ok(output) if output.success() => output,
            Ok(output) => {
                warn!(
                    "Failed to fetch issue #{} from {}/{}: {}",
                    reference.number,
                    reference.owner,
                    reference.repo,
                    output.stderr.trim()
                );
                return None;
            }
            Err(err) => {
                warn!("Failed to run GitHub CLI: {err:#}");
                return None;
            }
        };

        let raw: RawIssue = match serde_json::from_str(output.stdout.trim()) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Could not parse issue data from GitHub CLI: {err}");
                return None;
            }
        };

        debug!(
            "Fetched issue #{}: {} [{}]",
            raw.number, raw.title, raw.state
        );

        Some(IssueMetadata {
            number: raw.number,
            title: raw.title,
            body: raw.body.unwrap_or_default(),
            state: raw.state,
            url: raw.url,
            labels: raw.labels.into_iter().map(|label| label.name).collect(),
            assignees: raw
                .assignees
                .into_iter()
                .map(|assignee| assignee.login)
                .collect(),
            owner: reference.owner,
            repo: reference.repo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::testing::ScriptedRunner;

    #[test]
    fn test_parse_issue_url() {
        let reference = parse_issue_url("https://github.com/acme/widgets/issues/42").unwrap();
        assert_eq!(reference.owner, "acme");
        assert_eq!(reference.repo, "widgets");
        assert_eq!(reference.number, 42);
    }

    #[test]
    fn test_parse_issue_url_trailing_slash() {
        assert!(parse_issue_url("https://github.com/acme/widgets/issues/42/").is_some());
    }

    #[test]
    fn test_parse_issue_url_rejections() {
        assert!(parse_issue_url("not a url").is_none());
        assert!(parse_issue_url("https://github.com/acme/widgets").is_none());
        assert!(parse_issue_url("https://github.com/acme/widgets/pull/42").is_none());
        assert!(parse_issue_url("https://github.com/acme/widgets/issues/abc").is_none());
        assert!(parse_issue_url("https://github.com/acme/widgets/issues/").is_none());
    }

    fn issue_json() -> &'static str {
        r#"{
            "number": 42,
            "title": "Fix the flux capacitor",
            "body": "It is broken.",
            "state": "OPEN",
            "url": "https://github.com/acme/widgets/issues/42",
            "labels": [{"name": "bug"}, {"name": "p1"}],
            "assignees": [{"login": "marty"}]
        }"#
    }

    #[tokio::test]
    async fn test_fetch_issue_success() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("gh", &["--version"], CommandOutput::ok("gh version 2.40"));
        runner.respond("gh", &["auth", "status"], CommandOutput::ok("Logged in"));
        runner.respond("gh", &["issue", "view"], CommandOutput::ok(issue_json()));

        let fetcher = IssueFetcher::new(runner);
        let issue = fetcher
            .fetch_issue("https://github.com/acme/widgets/issues/42")
            .await
            .unwrap();

        assert_eq!(issue.number, 42);
        assert_eq!(issue.title, "Fix the flux capacitor");
        assert_eq!(issue.labels, vec!["bug", "p1"]);
        assert_eq!(issue.assignees, vec!["marty"]);
        assert_eq!(issue.owner, "acme");
        assert_eq!(issue.repo, "widgets");
    }

    #[tokio::test]
    async fn test_fetch_issue_bad_url_short_circuits() {
        let runner = Arc::new(ScriptedRunner::new());
        let fetcher = IssueFetcher::new(runner.clone());

        assert!(fetcher.fetch_issue("https://example.com/nope").await.is_none());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_issue_gh_missing() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_to_spawn("gh");

        let fetcher = IssueFetcher::new(runner);
        let issue = fetcher
            .fetch_issue("https://github.com/acme/widgets/issues/42")
            .await;
        assert!(issue.is_none());
    }

    #[tokio::test]
    async fn test_fetch_issue_unauthenticated() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("gh", &["--version"], CommandOutput::ok("gh version 2.40"));
        runner.respond(
            "gh",
            &["auth", "status"],
            CommandOutput::failed(1, "You are not logged into any GitHub hosts"),
        );

        let fetcher = IssueFetcher::new(runner.clone());
        let issue = fetcher
            .fetch_issue("https://github.com/acme/widgets/issues/42")
            .await;
        assert!(issue.is_none());
        assert_eq!(runner.call_count("issue view"), 0);
    }

    #[tokio::test]
    async fn test_fetch_issue_fetch_failure() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("gh", &["--version"], CommandOutput::ok("gh version 2.40"));
        runner.respond("gh", &["auth", "status"], CommandOutput::ok("Logged in"));
        runner.respond(
            "gh",
            &["issue", "view"],
            CommandOutput::failed(1, "GraphQL: Could not resolve to an Issue"),
        );

        let fetcher = IssueFetcher::new(runner);
        let issue = fetcher
            .fetch_issue("https://github.com/acme/widgets/issues/42")
            .await;
        assert!(issue.is_none());
    }
}

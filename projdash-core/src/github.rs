//! GitHub data through the `gh` command-line client.
//!
//! For projects whose `origin` points at github.com the pipeline collects
//! open issue and PR counts, the five newest of each, the latest Actions
//! run status and repository visibility. Missing or unauthenticated `gh`
//! disables collection for the run; a failed call skips one project.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Per-call limit on a `gh` invocation.
pub const GH_TIMEOUT: Duration = Duration::from_secs(10);

/// Newest open issues or PRs kept per project.
pub const TOP_ITEMS: usize = 5;

static SSH_REMOTE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^git@github\.com:([^/]+)/([^/]+?)(?:\.git)?$").ok());
static HTTPS_REMOTE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^https?://github\.com/([^/]+)/([^/]+?)(?:\.git)?$").ok());

const REPOSITORY_QUERY: &str = "query($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    visibility
    issues(states: OPEN, first: 5, orderBy: {field: CREATED_AT, direction: DESC}) {
      totalCount
      nodes { title number }
    }
    pullRequests(states: OPEN, first: 5, orderBy: {field: CREATED_AT, direction: DESC}) {
      totalCount
      nodes { title number }
    }
  }
}";

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRepo {
    pub owner: String,
    pub repo: String,
}

impl fmt::Display for OwnerRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Outcome of the most recent Actions run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiStatus {
    Success,
    Failure,
    Pending,
    #[default]
    None,
}

impl CiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Pending => "pending",
            Self::None => "none",
        }
    }
}

impl fmt::Display for CiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CiStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Success, Self::Failure, Self::Pending, Self::None]
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid CI status '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepoVisibility {
    Public,
    Private,
    #[default]
    NotOnGithub,
}

impl RepoVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::NotOnGithub => "not-on-github",
        }
    }
}

impl fmt::Display for RepoVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoVisibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Public, Self::Private, Self::NotOnGithub]
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("invalid visibility '{s}'"))
    }
}

/// An open issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub title: String,
    pub number: u64,
}

/// Everything collected for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubData {
    pub open_issues: u32,
    pub open_prs: u32,
    pub ci_status: CiStatus,
    pub top_issues: Vec<IssueRef>,
    pub top_prs: Vec<IssueRef>,
    pub repo_visibility: RepoVisibility,
}

/// `owner/repo` from an SSH or HTTPS github.com remote. Other hosts and
/// malformed URLs yield None.
pub fn parse_owner_repo(remote_url: &str) -> Option<OwnerRepo> {
    let url = remote_url.trim();
    [&*SSH_REMOTE, &*HTTPS_REMOTE]
        .into_iter()
        .flatten()
        .find_map(|re| re.captures(url))
        .map(|caps| OwnerRepo {
            owner: caps[1].to_string(),
            repo: caps[2].to_string(),
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Reply Parsing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Connection {
    total_count: u32,
    nodes: Vec<IssueRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    visibility: Option<String>,
    #[serde(default)]
    issues: Connection,
    #[serde(default)]
    pull_requests: Connection,
}

#[derive(Debug, Deserialize)]
struct RepositoryData {
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct GraphQlReply {
    data: Option<RepositoryData>,
}

/// Issue and PR counts, newest items and visibility from the GraphQL reply.
/// None when the reply carries no repository.
pub fn parse_repository(raw: &str) -> Option<GitHubData> {
    let reply: GraphQlReply = serde_json::from_str(raw).ok()?;
    let repo = reply.data?.repository?;
    let mut issues = repo.issues.nodes;
    let mut prs = repo.pull_requests.nodes;
    issues.truncate(TOP_ITEMS);
    prs.truncate(TOP_ITEMS);
    Some(GitHubData {
        open_issues: repo.issues.total_count,
        open_prs: repo.pull_requests.total_count,
        ci_status: CiStatus::None,
        top_issues: issues,
        top_prs: prs,
        repo_visibility: match repo.visibility.as_deref() {
            Some("PRIVATE") => RepoVisibility::Private,
            _ => RepoVisibility::Public,
        },
    })
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    status: Option<String>,
    conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRuns {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

/// CI status from `actions/runs?per_page=1`. Unknown shapes read as `none`.
pub fn parse_ci_status(raw: &str) -> CiStatus {
    let Ok(reply) = serde_json::from_str::<WorkflowRuns>(raw) else {
        return CiStatus::None;
    };
    let Some(run) = reply.workflow_runs.first() else {
        return CiStatus::None;
    };
    match (run.conclusion.as_deref(), run.status.as_deref()) {
        (Some("success"), _) => CiStatus::Success,
        (Some("failure"), _) => CiStatus::Failure,
        (_, Some("in_progress" | "queued")) => CiStatus::Pending,
        _ => CiStatus::None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sources
// ─────────────────────────────────────────────────────────────────────────────

/// Where repository data comes from.
#[async_trait]
pub trait GitHubSource: Send + Sync {
    /// Checked once per run; false disables collection for that run.
    async fn is_available(&self) -> bool;

    /// Data for one repository, or None when the lookup failed. Must be
    /// cancel-safe.
    async fn fetch(&self, repo: &OwnerRepo) -> Option<GitHubData>;
}

/// Shells out to `gh api`.
#[derive(Debug, Clone)]
pub struct GhCli {
    binary: String,
    timeout: Duration,
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GhCli {
    pub fn new() -> Self {
        Self {
            binary: "gh".to_string(),
            timeout: GH_TIMEOUT,
        }
    }

    /// Use a different executable (path or name on `PATH`).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Trimmed stdout of a successful call; None on spawn failure, non-zero
    /// exit or timeout.
    async fn run(&self, args: &[&str]) -> Option<String> {
        let output = match tokio::time::timeout(self.timeout, self.command(args).output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!("{} {}: {}", self.binary, args.join(" "), e);
                return None;
            }
            Err(_) => {
                debug!("{} {} timed out", self.binary, args.join(" "));
                return None;
            }
        };
        if !output.status.success() {
            debug!(
                "{} {} exited {:?}: {}",
                self.binary,
                args.join(" "),
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl GitHubSource for GhCli {
    async fn is_available(&self) -> bool {
        self.run(&["auth", "status"]).await.is_some()
    }

    async fn fetch(&self, repo: &OwnerRepo) -> Option<GitHubData> {
        let query = format!("query={}", REPOSITORY_QUERY);
        let owner = format!("owner={}", repo.owner);
        let name = format!("name={}", repo.repo);
        let raw = self
            .run(&["api", "graphql", "-f", &query, "-f", &owner, "-f", &name])
            .await?;
        let mut data = parse_repository(&raw)?;

        let runs = format!("repos/{}/{}/actions/runs?per_page=1", repo.owner, repo.repo);
        if let Some(raw) = self.run(&["api", &runs]).await {
            data.ci_status = parse_ci_status(&raw);
        }
        Some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_repo(owner: &str, repo: &str) -> Option<OwnerRepo> {
        Some(OwnerRepo {
            owner: owner.into(),
            repo: repo.into(),
        })
    }

    #[test]
    fn test_parse_owner_repo() {
        assert_eq!(parse_owner_repo("git@github.com:owner/repo.git"), owner_repo("owner", "repo"));
        assert_eq!(parse_owner_repo("git@github.com:owner/repo"), owner_repo("owner", "repo"));
        assert_eq!(
            parse_owner_repo("https://github.com/owner/repo.git\n"),
            owner_repo("owner", "repo")
        );
        assert_eq!(parse_owner_repo("http://github.com/o/r"), owner_repo("o", "r"));
        assert_eq!(parse_owner_repo("git@gitlab.com:owner/repo.git"), None);
        assert_eq!(parse_owner_repo("https://github.com/owner"), None);
        assert_eq!(parse_owner_repo(""), None);
        assert_eq!(parse_owner_repo("not-a-url"), None);
    }

    #[test]
    fn test_parse_repository() {
        let raw = r#"{"data":{"repository":{
            "visibility":"PRIVATE",
            "issues":{"totalCount":12,"nodes":[{"title":"Crash on start","number":40},{"title":"Docs","number":38}]},
            "pullRequests":{"totalCount":0,"nodes":[]}
        }}}"#;
        let data = parse_repository(raw).unwrap();
        assert_eq!(data.open_issues, 12);
        assert_eq!(data.open_prs, 0);
        assert_eq!(data.repo_visibility, RepoVisibility::Private);
        assert_eq!(data.top_issues[0], IssueRef { title: "Crash on start".into(), number: 40 });
        assert!(data.top_prs.is_empty());
        assert_eq!(data.ci_status, CiStatus::None);
    }

    #[test]
    fn test_parse_repository_defaults() {
        let public = parse_repository(r#"{"data":{"repository":{"visibility":"INTERNAL"}}}"#).unwrap();
        assert_eq!(public.repo_visibility, RepoVisibility::Public);
        assert_eq!(public.open_issues, 0);

        assert_eq!(parse_repository(r#"{"data":{"repository":null}}"#), None);
        assert_eq!(parse_repository(r#"{"errors":[{"message":"Could not resolve"}]}"#), None);
        assert_eq!(parse_repository("gh: not logged in"), None);
    }

    #[test]
    fn test_parse_ci_status() {
        let run = |status: &str, conclusion: &str| {
            parse_ci_status(&format!(
                r#"{{"workflow_runs":[{{"status":{status},"conclusion":{conclusion}}}]}}"#
            ))
        };
        assert_eq!(run(r#""completed""#, r#""success""#), CiStatus::Success);
        assert_eq!(run(r#""completed""#, r#""failure""#), CiStatus::Failure);
        assert_eq!(run(r#""in_progress""#, "null"), CiStatus::Pending);
        assert_eq!(run(r#""queued""#, "null"), CiStatus::Pending);
        assert_eq!(run(r#""completed""#, r#""cancelled""#), CiStatus::None);
        assert_eq!(parse_ci_status(r#"{"workflow_runs":[]}"#), CiStatus::None);
        assert_eq!(parse_ci_status("<html>"), CiStatus::None);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_value(RepoVisibility::NotOnGithub).unwrap(), "not-on-github");
        assert_eq!(serde_json::to_value(CiStatus::Pending).unwrap(), "pending");
        assert_eq!("not-on-github".parse(), Ok(RepoVisibility::NotOnGithub));
        assert_eq!("failure".parse(), Ok(CiStatus::Failure));
        assert!("green".parse::<CiStatus>().is_err());
    }

    #[tokio::test]
    async fn test_missing_gh_is_unavailable() {
        let gh = GhCli::new().with_binary("/nonexistent/gh-binary");
        assert!(!gh.is_available().await);
        assert_eq!(gh.fetch(&OwnerRepo { owner: "o".into(), repo: "r".into() }).await, None);
    }
}

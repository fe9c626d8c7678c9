//! Git facts for a project directory.
//!
//! Every query shells out to `git -C <path>`. A failing command is treated as
//! "no information" rather than an error, since most directories under a dev
//! root are partially configured repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// One entry from `git log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub date: String,
    pub message: String,
}

/// Git state collected for one directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitInfo {
    pub is_repo: bool,
    pub last_commit_date: Option<String>,
    pub branch_name: Option<String>,
    pub remote_url: Option<String>,
    pub days_inactive: Option<i64>,
    pub is_dirty: bool,
    pub dirty_file_count: u32,
    pub ahead: u32,
    pub behind: u32,
    pub recent_commits: Vec<Commit>,
    pub branch_count: u32,
    pub stash_count: u32,
}

/// Run a git command in `path`, returning trimmed stdout when it succeeds
/// and produced output.
fn run_git(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(["-C", &path.to_string_lossy()])
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .ok()?;

    if !output.status.success() {
        debug!(
            "git {:?} failed in {}: {}",
            args,
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() { None } else { Some(stdout) }
}

/// Whole days between an ISO-8601 commit date and `now`.
pub fn days_between(commit_date: &str, now: DateTime<Utc>) -> Option<i64> {
    let then = DateTime::parse_from_rfc3339(commit_date).ok()?;
    let days = (now - then.with_timezone(&Utc)).num_days();
    Some(days.max(0))
}

/// Parse `git rev-list --count --left-right @{upstream}...HEAD` output
/// into `(behind, ahead)`.
fn parse_left_right(output: &str) -> (u32, u32) {
    let mut parts = output.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(behind), Some(ahead)) => (behind.parse().unwrap_or(0), ahead.parse().unwrap_or(0)),
        _ => (0, 0),
    }
}

fn count_lines(output: Option<String>) -> u32 {
    output.map(|s| s.lines().count() as u32).unwrap_or(0)
}

/// Collect git facts for `path` relative to `now`.
pub fn git_info(path: &Path, now: DateTime<Utc>) -> GitInfo {
    if !path.join(".git").exists() {
        return GitInfo::default();
    }

    let last_commit_date = run_git(path, &["log", "-1", "--format=%aI"]);
    let days_inactive = last_commit_date
        .as_deref()
        .and_then(|date| days_between(date, now));

    let branch_name = run_git(path, &["rev-parse", "--abbrev-ref", "HEAD"])
        .filter(|b| b != "HEAD");
    let remote_url = run_git(path, &["remote", "get-url", "origin"]);

    let status = run_git(path, &["status", "--porcelain"]);
    let dirty_file_count = count_lines(status);

    let (behind, ahead) = if branch_name.is_some() {
        run_git(
            path,
            &["rev-list", "--count", "--left-right", "@{upstream}...HEAD"],
        )
        .map(|out| parse_left_right(&out))
        .unwrap_or((0, 0))
    } else {
        (0, 0)
    };

    let recent_commits = run_git(path, &["log", "-10", "--format=%H|%aI|%s"])
        .map(|out| {
            out.lines()
                .filter_map(|line| {
                    let mut parts = line.splitn(3, '|');
                    Some(Commit {
                        hash: parts.next()?.to_string(),
                        date: parts.next()?.to_string(),
                        message: parts.next()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    GitInfo {
        is_repo: true,
        last_commit_date,
        branch_name,
        remote_url,
        days_inactive,
        is_dirty: dirty_file_count > 0,
        dirty_file_count,
        ahead,
        behind,
        recent_commits,
        branch_count: count_lines(run_git(path, &["branch", "--list"])),
        stash_count: count_lines(run_git(path, &["stash", "list"])),
    }
}

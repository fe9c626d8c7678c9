//! Filesystem scanner producing one fact record per project directory.
//!
//! The scanner looks at the immediate children of a dev root. Each child is a
//! project; its facts come from git plus a handful of marker files. Scanning
//! is blocking I/O, so async callers should run it on a blocking thread.

mod detect;
mod git;

pub use detect::SourceCounts;
pub use git::{days_between, Commit};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Detected languages for a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Languages {
    pub primary: Option<String>,
    pub detected: Vec<String>,
}

/// Presence flags for hygiene-relevant files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileFlags {
    pub readme: bool,
    pub tests: bool,
    pub env: bool,
    pub env_example: bool,
    pub dockerfile: bool,
    pub docker_compose: bool,
    pub linter_config: bool,
    pub license: bool,
    pub lockfile: bool,
}

/// Raw, unscored observation of one project directory.
///
/// Serialized as camelCase JSON into the Scan layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FactRecord {
    pub name: String,
    pub path: String,
    pub path_hash: String,
    pub is_repo: bool,
    /// Whole days since the last commit, `None` when unknown.
    pub days_inactive: Option<i64>,
    pub is_dirty: bool,
    pub dirty_file_count: u32,
    pub ahead: u32,
    pub behind: u32,
    pub branch_count: u32,
    pub stash_count: u32,
    pub branch_name: Option<String>,
    pub remote_url: Option<String>,
    pub last_commit_date: Option<String>,
    pub recent_commits: Vec<Commit>,
    pub todo_count: u32,
    pub fixme_count: u32,
    pub loc_estimate: u64,
    pub languages: Languages,
    pub files: FileFlags,
    pub cicd: BTreeMap<String, bool>,
    pub deployment: BTreeMap<String, bool>,
    pub framework: Option<String>,
    pub services: Vec<String>,
    pub package_manager: Option<String>,
    pub description: Option<String>,
    pub scripts: Vec<String>,
    /// Set when the directory could not be read; such a fact is not scored.
    pub scan_error: Option<String>,
}

impl FactRecord {
    /// Whether scoring may run on this fact.
    pub fn is_scoreable(&self) -> bool {
        self.scan_error.is_none()
    }
}

/// Stable project id: SHA-256 of the absolute path, first 16 hex characters.
pub fn path_hash(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(16);
    hex
}

/// SHA-256 hex digest of arbitrary content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Source of fact records for a refresh.
pub trait Scanner: Send + Sync {
    /// Scan the whole batch. An error here is fatal for the run.
    fn scan(&self) -> Result<Vec<FactRecord>>;
}

/// Scanner over the immediate subdirectories of a dev root.
#[derive(Debug, Clone)]
pub struct FsScanner {
    root: PathBuf,
    exclude: Vec<String>,
}

impl FsScanner {
    pub fn new(root: impl Into<PathBuf>, exclude: Vec<String>) -> Self {
        Self {
            root: root.into(),
            exclude,
        }
    }

    /// Candidate project directories, sorted by name.
    ///
    /// Hidden and excluded directories are skipped.
    pub fn list_project_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(Error::scan(format!(
                "scan root not found: {}",
                self.root.display()
            )));
        }

        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || self.exclude.iter().any(|e| e == &name) {
                continue;
            }
            dirs.push(entry.path());
        }
        dirs.sort();
        Ok(dirs)
    }
}

impl Scanner for FsScanner {
    fn scan(&self) -> Result<Vec<FactRecord>> {
        let now = Utc::now();
        let dirs = self.list_project_dirs()?;
        info!("Scanning {} directories under {}", dirs.len(), self.root.display());

        Ok(dirs.iter().map(|dir| scan_project(dir, now)).collect())
    }
}

/// Build the fact record for one directory.
///
/// Never fails: an unreadable directory yields a fact with `scan_error` set.
pub fn scan_project(path: &Path, now: DateTime<Utc>) -> FactRecord {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut fact = FactRecord {
        name,
        path: path.to_string_lossy().to_string(),
        path_hash: path_hash(path),
        ..Default::default()
    };

    match detect::check_files(path) {
        Ok(files) => fact.files = files,
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            fact.scan_error = Some(e.to_string());
            return fact;
        }
    }

    let git = git::git_info(path, now);
    fact.is_repo = git.is_repo;
    fact.days_inactive = git.days_inactive;
    fact.is_dirty = git.is_dirty;
    fact.dirty_file_count = git.dirty_file_count;
    fact.ahead = git.ahead;
    fact.behind = git.behind;
    fact.branch_count = git.branch_count;
    fact.stash_count = git.stash_count;
    fact.branch_name = git.branch_name;
    fact.remote_url = git.remote_url;
    fact.last_commit_date = git.last_commit_date;
    fact.recent_commits = git.recent_commits;

    let counts = detect::count_source_lines(path);
    fact.todo_count = counts.todo;
    fact.fixme_count = counts.fixme;
    fact.loc_estimate = counts.loc;

    fact.languages = detect::detect_languages(path);
    fact.cicd = detect::check_cicd(path);
    fact.deployment = detect::check_deployment(path);
    fact.framework = detect::detect_framework(path);
    fact.services = detect::detect_services(path);
    fact.package_manager = detect::detect_package_manager(path);
    fact.description = detect::detect_description(path);
    fact.scripts = detect::detect_scripts(path);

    debug!("Scanned {}: {:?} days inactive", fact.name, fact.days_inactive);
    fact
}

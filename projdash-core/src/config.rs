//! Configuration for projdash.
//!
//! Loaded from `$PROJDASH_DIR/config.toml` (default `~/.projdash`), then
//! overridden by environment variables:
//!
//! ```text
//! ~/.projdash/
//! ├── config.toml    # Optional configuration
//! ├── projdash.db    # Inventory database
//! └── server.pid     # Written by projdash-server
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub server: ServerConfig,

    /// Directory holding the database and runtime files. Not read from the file.
    #[serde(skip, default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory whose immediate children are projects
    #[serde(default = "default_dev_root")]
    pub dev_root: PathBuf,

    /// Child directory names never treated as projects
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Enrichment is off unless explicitly enabled
    #[serde(default)]
    pub enabled: bool,

    /// One of `claude-cli`, `ollama`, `openrouter`, `mlx`, `codex-cli`
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Permit providers that can edit files or run commands (`codex-cli`)
    #[serde(default)]
    pub allow_unsafe: bool,

    /// Per-project enrichment timeout
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Replace user metadata with enrichment suggestions instead of filling blanks
    #[serde(default)]
    pub overwrite_metadata: bool,

    #[serde(default)]
    pub claude_model: Option<String>,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    #[serde(default)]
    pub openrouter_api_key: Option<String>,

    #[serde(default = "default_openrouter_model")]
    pub openrouter_model: String,

    #[serde(default = "default_mlx_url")]
    pub mlx_url: String,

    #[serde(default = "default_mlx_model")]
    pub mlx_model: String,

    /// Log raw prompts and responses at debug level
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Collect issues, PRs and CI status through `gh` when it is logged in
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// A run guard older than this is considered abandoned
    #[serde(default = "default_stale_run")]
    pub stale_run_secs: u64,

    #[serde(default = "default_retention_days")]
    pub activity_retention_days: u32,

    /// Capacity of the progress event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

// Default value functions
fn default_dev_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dev")
}

fn default_exclude_dirs() -> Vec<String> {
    ["_projects_dashboard", "node_modules", ".venv", "__pycache__", ".git"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_provider() -> String {
    "claude-cli".to_string()
}

fn default_llm_timeout() -> u64 {
    180
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3".to_string()
}

fn default_openrouter_model() -> String {
    "anthropic/claude-sonnet-4".to_string()
}

fn default_mlx_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_mlx_model() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_stale_run() -> u64 {
    600 // 10 minutes
}

fn default_retention_days() -> u32 {
    90
}

fn default_event_buffer() -> usize {
    256
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3077
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".projdash")
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            dev_root: default_dev_root(),
            exclude_dirs: default_exclude_dirs(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            allow_unsafe: false,
            timeout_secs: default_llm_timeout(),
            overwrite_metadata: false,
            claude_model: None,
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            openrouter_api_key: None,
            openrouter_model: default_openrouter_model(),
            mlx_url: default_mlx_url(),
            mlx_model: default_mlx_model(),
            debug: false,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stale_run_secs: default_stale_run(),
            activity_retention_days: default_retention_days(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            llm: LlmConfig::default(),
            github: GitHubConfig::default(),
            pipeline: PipelineSettings::default(),
            server: ServerConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load configuration from `$PROJDASH_DIR` (or `~/.projdash`) and the
    /// process environment. Creates the data directory if missing.
    pub fn load() -> Result<Self> {
        let dir = std::env::var("PROJDASH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let mut config = Self::load_from_dir(&dir)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load `config.toml` from `dir` without consulting the environment.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("config.toml");
        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)
                .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?
        } else {
            Config::default()
        };

        config.data_dir = dir.to_path_buf();
        config.scan.dev_root = expand_home(&config.scan.dev_root);
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = var("DEV_ROOT") {
            self.scan.dev_root = expand_home(Path::new(root.trim()));
        }
        if let Some(exclude) = var("EXCLUDE_DIRS") {
            self.scan.exclude_dirs = exclude
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("FEATURE_LLM") {
            self.llm.enabled = parse_bool(&v);
        }
        if let Some(v) = var("LLM_PROVIDER") {
            self.llm.provider = v.trim().to_string();
        }
        if let Some(v) = var("LLM_ALLOW_UNSAFE") {
            self.llm.allow_unsafe = parse_bool(&v);
        }
        if let Some(v) = var("LLM_OVERWRITE_METADATA") {
            self.llm.overwrite_metadata = parse_bool(&v);
        }
        if let Some(v) = var("LLM_DEBUG") {
            self.llm.debug = parse_bool(&v);
        }
        if let Some(v) = var("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = v
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("LLM_TIMEOUT_SECS is not a number: {}", v)))?;
        }
        if let Some(v) = var("CLAUDE_CLI_MODEL") {
            self.llm.claude_model = Some(v);
        }
        if let Some(v) = var("OLLAMA_URL") {
            self.llm.ollama_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = var("OLLAMA_MODEL") {
            self.llm.ollama_model = v;
        }
        if let Some(v) = var("OPENROUTER_API_KEY") {
            self.llm.openrouter_api_key = Some(v);
        }
        if let Some(v) = var("OPENROUTER_MODEL") {
            self.llm.openrouter_model = v;
        }
        if let Some(v) = var("MLX_URL") {
            self.llm.mlx_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = var("MLX_MODEL") {
            self.llm.mlx_model = v;
        }
        if let Some(v) = var("FEATURE_GITHUB") {
            self.github.enabled = parse_bool(&v);
        }
        if let Some(v) = var("PROJDASH_PORT") {
            self.server.port = v
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("PROJDASH_PORT is not a port: {}", v)))?;
        }
        Ok(())
    }

    /// Database file, honoring `PROJDASH_DATABASE_PATH`.
    pub fn database_path(&self) -> PathBuf {
        std::env::var("PROJDASH_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.data_dir.join("projdash.db"))
    }

    pub fn pid_file(&self) -> PathBuf {
        self.data_dir.join("server.pid")
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn stale_run_after(&self) -> Duration {
        Duration::from_secs(self.pipeline.stale_run_secs)
    }
}

/// `"true"` and `"1"` are true; everything else is false.
fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

//! Error types for projdash-core.

use thiserror::Error;

/// Result type alias using projdash-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for projdash operations
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    // Pipeline errors
    #[error("A refresh is already running")]
    AlreadyRunning,

    #[error("Scan failed: {0}")]
    Scan(String),

    #[error("Pipeline failed: {0}")]
    Pipeline(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a scan error
    pub fn scan(msg: impl Into<String>) -> Self {
        Self::Scan(msg.into())
    }

    /// Create a pipeline error
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True when the error means another refresh holds the run guard.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyRunning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_distinguishable() {
        assert!(Error::AlreadyRunning.is_conflict());
        assert!(!Error::scan("boom").is_conflict());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::scan("root missing").to_string(), "Scan failed: root missing");
        assert_eq!(
            Error::ProjectNotFound("abc".into()).to_string(),
            "Project not found: abc"
        );
    }
}

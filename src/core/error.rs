//! Error types for source acquisition.
//!
//! Every variant is fatal for the recipe instance that raised it. Archive
//! members outside the sandbox are not errors; they are skipped and reported
//! by the extractor.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("malformed specification {spec:?}: {reason} (tokens: {tokens:?})")]
    MalformedSpec {
        spec: String,
        tokens: Vec<String>,
        reason: String,
    },

    #[error("version {0:?} is not supported")]
    UnsupportedVersion(String),

    #[error("unsupported version control system: {0}")]
    UnsupportedVcs(String),

    #[error("{} not found, and offline mode requested", .0.display())]
    OfflineUnavailable(PathBuf),

    #[error("wanted version {version:?} not found on server (tried {url})")]
    VersionNotFound { version: String, url: String },

    #[error("the archive does not seem valid: {}: {reason}", path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("unsafe archive {}: {reason}", path.display())]
    UnsafeArchive { path: PathBuf, reason: String },

    #[error("{kind} failed for {}: {reason}", target.display())]
    VcsError {
        kind: String,
        target: PathBuf,
        reason: String,
    },

    #[error("unsafe to freeze {}: {reason}", path.display())]
    UnsafeFreeze { path: PathBuf, reason: String },

    #[error("installation error: {0}")]
    InstallationError(String),

    #[error("download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    pub(crate) fn malformed(spec: &str, tokens: &[&str], reason: impl Into<String>) -> Self {
        SourceError::MalformedSpec {
            spec: spec.to_string(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            reason: reason.into(),
        }
    }

    pub(crate) fn vcs(kind: &str, target: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SourceError::VcsError {
            kind: kind.to_string(),
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Attach a path to an `io::Error`.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| SourceError::Io {
            path: path.into(),
            source,
        })
    }
}

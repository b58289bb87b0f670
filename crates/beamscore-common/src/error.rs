//! Error taxonomy shared by the scoring pipeline.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced while configuring or running a scoring pass.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// Invalid or inconsistent options. Raised before any inference runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Numerically degenerate distributions or inconsistent batch state.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Unreadable or unwritable model, dataset or result files.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification of a [`ScoreError`], used for exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Decoding,
    Io,
}

impl ScoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn decoding(msg: impl Into<String>) -> Self {
        Self::Decoding(msg.into())
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io { path: path.as_ref().to_path_buf(), source }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Decoding(_) => ErrorKind::Decoding,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub const fn is_decoding(&self) -> bool {
        matches!(self, Self::Decoding(_))
    }
}

impl From<serde_json::Error> for ScoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(format!("invalid JSON: {err}"))
    }
}

impl From<toml::de::Error> for ScoreError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(format!("invalid TOML: {err}"))
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, ScoreError>;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LincheckError {
    #[error("Failed to read operations log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record on line {line}: {reason} (raw: {content:?})")]
    Parse {
        line: usize,
        content: String,
        reason: String,
    },

    #[error("No confirmed operations to validate ({ambiguous} ambiguous operations ignored)")]
    NoOperations { ambiguous: usize },

    #[error(
        "Client {client_id} has overlapping operations on line {first_line} and line {second_line}"
    )]
    OverlappingClientOperations {
        client_id: u64,
        first_line: usize,
        second_line: usize,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl LincheckError {
    pub(crate) fn parse(line: usize, content: &str, reason: impl Into<String>) -> Self {
        LincheckError::Parse {
            line,
            content: content.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<tokio::task::JoinError> for LincheckError {
    fn from(err: tokio::task::JoinError) -> Self {
        LincheckError::Internal {
            message: format!("check worker failed: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, LincheckError>;
pub type LincheckResult<T> = std::result::Result<T, LincheckError>;

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid download URL: {0}")]
    InvalidUrl(String),

    #[error("invalid scoring function: {0}")]
    InvalidScoring(String),

    #[error("invalid search mode: {0}")]
    InvalidSearchMode(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    ConfigValue(String),

    #[error("URI list not found at {0}")]
    MissingUriList(PathBuf),

    #[error("no download URLs found in {0}")]
    EmptyUriList(PathBuf),

    #[error("receptor file not found at {0}")]
    MissingReceptor(PathBuf),

    #[error("no ligand files found in {0}")]
    NoLigands(PathBuf),

    #[error("input directory not found: {0}")]
    MissingInput(PathBuf),

    #[error("download request failed: {0}")]
    Http(String),

    #[error("download timed out: {0}")]
    Timeout(String),

    #[error("server returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("malformed record file {path}: {message}")]
    MalformedRecords { path: PathBuf, message: String },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("docking engine failed to launch: {0}")]
    EngineLaunch(String),

    #[error("interrupted; progress saved to {0}")]
    Interrupted(PathBuf),
}

impl PipelineError {
    /// Whether a failed fetch attempt is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Http(_) | PipelineError::Timeout(_) => true,
            PipelineError::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

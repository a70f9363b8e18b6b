use std::path::PathBuf;

use litscout_harvester::HarvesterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Harvester(#[from] HarvesterError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("classifier request failed: {0}")]
    ClassifierRequest(#[from] reqwest::Error),

    #[error("classifier API error (status {status}): {message}")]
    ClassifierApi { status: u16, message: String },

    #[error("classifier returned empty response")]
    ClassifierEmptyResponse,

    #[error("failed to parse classifier response: {0}")]
    ClassifierResponseParse(String),

    #[error("text extraction failed for {path}: {message}")]
    TextExtraction { path: PathBuf, message: String },

    #[error("failed to move {from} to {to} after {attempts} attempts: {source}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        attempts: u32,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

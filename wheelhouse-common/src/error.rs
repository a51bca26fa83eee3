use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Requirement Input Error: {0}")]
    Input(String),

    #[error("API Error: {0}")]
    Api(String),

    #[error("DownloadError: Failed to download '{0}' from '{1}': {2}")]
    Download(String, String, String),

    #[error("HttpError: {0}")]
    HttpError(String),

    #[error("Checksum Mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Parsing Error in {0}: {1}")]
    Parse(&'static str, String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Index Write Error: {0}")]
    IndexWrite(String),

    #[error("Publish Error: {0}")]
    Publish(String),

    #[error("IoError: {0}")]
    IoError(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

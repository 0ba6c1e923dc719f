use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to the message source. These end the run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not decode page from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read replay file {}: {source}", path.display())]
    ReplayIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse replay file {}: {source}", path.display())]
    ReplayParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot i/o on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Media download failures. The pipeline logs these and keeps going.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("media cache i/o on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

//! Error types shared by the store, the capture step and the session.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to read or write the JSON store. Always surfaced to the operator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot access store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store {path} is not a valid collection: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode collection: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failure while downloading or saving a captured image. Logged, never fatal.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("candidate has no extracted image url")]
    MissingUrl,

    #[error("no candidate at seed {seed}, index {candidate}")]
    MissingCandidate { seed: usize, candidate: usize },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("payload is not a readable image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("the viewer did not provide a share link")]
    MissingShareLink,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no candidate is selected")]
    NoCurrentCandidate,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

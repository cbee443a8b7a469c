//! Error types for the bridge core.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("asset not found: {}", .0.display())]
    AssetMissing(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} exceeds the {limit} byte read limit", .path.display())]
    TooLarge { path: PathBuf, limit: u64 },

    #[error("pose frame sequence is empty")]
    EmptySequence,

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    #[error("failed to open link: {0}")]
    Opener(String),

    #[error("update install failed: {0}")]
    Installer(String),
}

/// Why a single frame could not be handed to a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("consumer is gone")]
    Gone,

    #[error("consumer is not keeping up, frame dropped")]
    Backpressure,
}

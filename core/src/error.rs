//! Error types for the edge control plane.

/// Errors from configuration loading and snapshot persistence.
///
/// Network failures never surface here: the bridge and event emitter treat
/// them as connectivity flags, not errors, so the cycle loop stays fatal-free.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid cycle timing: {reason}")]
    InvalidTiming { reason: String },
}

//! Error types for the federation controller.

#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed topology {path}: {source}")]
    Topology {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

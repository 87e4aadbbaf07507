// Error types for remote storage operations

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("remote storage error: {0}")]
    Store(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed bundle {path}: {reason}")]
    BadBundle { path: String, reason: String },

    #[error("no entry named {name} in bundle {path}")]
    EntryNotFound { path: String, name: String },

    #[error("bundle index encoding: {0}")]
    Index(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub(crate) fn bad_bundle(path: &object_store::path::Path, reason: impl Into<String>) -> Self {
        StoreError::BadBundle {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// All errors that can be returned by a journal or cache store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No journal with the given id.
    #[error("journal not found: {id}")]
    JournalNotFound { id: String },

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A backend-specific storage error (I/O, poisoned lock, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Backend(e.to_string())
    }
}

use choreo_core::ScanError;
use choreo_runtime::{CacheError, RuntimeError};

#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{path}': {message}")]
    Config { path: String, message: String },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("{0}")]
    Usage(String),
}

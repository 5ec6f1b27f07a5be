use choreo_storage::StorageError;

/// Structural errors raised while stepping an activity.
///
/// These mean the compiled activity or the caller's usage is inconsistent.
/// Failures of the actions themselves are never reported here; they are
/// recorded on the journal instead.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("fork in a fork not supported (branch {branch} at '{action}')")]
    ForkInFork { branch: u32, action: String },

    #[error("split in a fork not supported (branch {branch} at '{action}')")]
    SplitInFork { branch: u32, action: String },

    #[error("action '{action}' is not part of the compiled activity")]
    MissingAction { action: String },

    #[error("join #{id} is not part of the compiled activity")]
    MissingJoin { id: u32 },

    #[error("branch {branch} does not exist")]
    MissingBranch { branch: u32 },

    #[error("action '{action}' expects a decision")]
    DecisionExpected { action: String },

    #[error("did not expect a decision for action '{action}'")]
    UnexpectedDecision { action: String },

    #[error("decision '{value}' for action '{action}' is not one of: {}", expected.join(", "))]
    UnknownDiscriminant {
        action: String,
        value: String,
        expected: Vec<String>,
    },

    #[error("no invocable for action '{action}'")]
    UnresolvedAction { action: String },

    #[error("split has no branch named '{branch}'")]
    UnknownBranch { branch: String },

    #[error("no split is waiting for a branch choice")]
    NoPendingSplit,

    #[error("no step is waiting to be settled")]
    NoPendingStep,

    #[error("no compiled activity for unit '{unit}' and tags {tags}")]
    NoActivity { unit: String, tags: String },

    #[error("journal belongs to unit '{journal}', not '{table}'")]
    UnitMismatch { journal: String, table: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Errors of the compiled-graph cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("corrupt cache entry '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

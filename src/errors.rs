/// GitBoss core error types
#[derive(Debug, thiserror::Error)]
pub enum GitbossError {
    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Branch management errors
    #[error("Branch error: {0}")]
    Branch(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The underlying engine mutation failed; no partial state is retained
    #[error("Engine failure during {operation}: {reason}")]
    EngineFailure { operation: String, reason: String },

    /// Undo requested out of stack order; the blocking records must be
    /// rewound first, newest to oldest
    #[error("Cannot rewind record {requested}: records {blocking:?} on '{branch}' are still applied")]
    StaleRewind {
        requested: u64,
        blocking: Vec<u64>,
        branch: String,
    },

    /// A resumed rebase plan no longer matches live repository state;
    /// recoverable by re-simulating
    #[error("Rebase plan desynchronized: {0}")]
    PlanDesynchronized(String),

    /// A force-push would discard remote commits and was not overridden,
    /// or the remote moved since the check; recoverable by re-checking
    #[error("Force-push to '{branch}' rejected: {reason} ({discarded} commit(s) would be discarded)")]
    ForcePushRejected {
        branch: String,
        reason: String,
        discarded: usize,
    },

    /// Journal errors (missing records, bad state transitions)
    #[error("Journal error: {0}")]
    Journal(String),

    /// Pattern store errors
    #[error("Pattern store error: {0}")]
    Store(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl GitbossError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GitbossError::Config(msg.into())
    }

    pub fn branch<S: Into<String>>(msg: S) -> Self {
        GitbossError::Branch(msg.into())
    }

    pub fn journal<S: Into<String>>(msg: S) -> Self {
        GitbossError::Journal(msg.into())
    }

    pub fn store<S: Into<String>>(msg: S) -> Self {
        GitbossError::Store(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        GitbossError::Validation(msg.into())
    }

    pub fn engine_failure<S: Into<String>>(operation: S, reason: S) -> Self {
        GitbossError::EngineFailure {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn plan_desynchronized<S: Into<String>>(msg: S) -> Self {
        GitbossError::PlanDesynchronized(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GitbossError>;

//! Crate-level error type shared by the store adapter, the orchestrator,
//! and backend implementations.

/// Error produced by store and orchestrator operations.
///
/// The variants preserve the failure *kind* across layers: the orchestrator
/// wraps lower-level failures without translating them, so a retry loop can
/// always recognize [`Concurrency`](StoreError::Concurrency) no matter which
/// operation surfaced it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record failed structural or facet validation before dispatch.
    ///
    /// The write was never sent to the backend. Indicates a caller bug;
    /// never retryable.
    #[error("invalid record: {0}")]
    Validation(String),

    /// The transactional write would exceed the backend's per-transaction
    /// item ceiling.
    ///
    /// The caller must split the work into smaller commits.
    #[error("transaction of {count} items exceeds the backend limit of {limit}")]
    Capacity {
        /// Number of items the rejected transaction would have contained.
        count: usize,
        /// The backend's per-transaction ceiling.
        limit: usize,
    },

    /// A conditional put in the transactional write lost a race with a
    /// concurrent commit.
    ///
    /// Nothing was written. Retryable: re-read and re-append, or fall back
    /// to a full replay.
    #[error("conditional write conflict on partition {partition}")]
    Concurrency {
        /// Partition key of the row whose condition failed.
        partition: String,
    },

    /// Transport or storage failure below the conditional-write layer.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A payload could not be encoded to or decoded from its persisted form.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Wrap an arbitrary backend failure.
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        StoreError::Backend(err.into())
    }

    /// Whether the failed operation may be retried as-is.
    ///
    /// Only [`Concurrency`](StoreError::Concurrency) conflicts are
    /// retryable; every other variant signals a caller bug or a failure
    /// the engine cannot recover from on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Concurrency { .. })
    }
}

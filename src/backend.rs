//! Transactional composite-key KV abstraction the engine writes through.
//!
//! The engine needs exactly three primitives: a consistent point read, a
//! consistent range scan of one partition, and an atomic multi-item write
//! where every item carries its own conditional predicate. Anything that
//! can honor those semantics (a DynamoDB-style table, an embedded map) can
//! sit behind this trait.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::Record;

/// Per-item predicate attached to a put inside a transactional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// The row must not exist yet.
    ///
    /// Applied to inbound and outbound rows; a pre-existing row means a
    /// concurrent commit already claimed the sequence.
    NotExists,
    /// The row must not exist, or its current sequence must equal the
    /// given value.
    ///
    /// Applied to the state row; this is the engine's optimistic-concurrency
    /// check.
    NotExistsOrSeqEquals(u64),
}

/// One put inside a transactional write, with its predicate.
#[derive(Debug, Clone)]
pub struct ConditionalPut {
    /// The row to write.
    pub record: Record,
    /// The predicate that must hold for the whole transaction to commit.
    pub condition: PutCondition,
}

impl ConditionalPut {
    /// Pair a record with its predicate.
    pub fn new(record: Record, condition: PutCondition) -> Self {
        Self { record, condition }
    }
}

/// A transactional composite-key KV store.
///
/// # Contract
///
/// - Reads are strongly consistent: a `get_item` or `query_partition` after
///   a successful `transact_write` observes that write.
/// - `transact_write` is atomic: either every put lands or none does. A
///   failed predicate on any item aborts the whole transaction with
///   [`StoreError::Concurrency`].
/// - Implementations must not substitute a loop of individual puts for the
///   transactional write; partial commits violate the engine's invariants.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Consistent point read of one row. Returns `None` when absent.
    async fn get_item(&self, partition: &str, sort: &str) -> Result<Option<Record>, StoreError>;

    /// Consistent range scan of every row under a partition, in sort-key
    /// order.
    async fn query_partition(&self, partition: &str) -> Result<Vec<Record>, StoreError>;

    /// Atomic multi-item conditional write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Concurrency`] when any put's predicate fails,
    /// with nothing written. Other failures surface as
    /// [`StoreError::Backend`].
    async fn transact_write(&self, puts: Vec<ConditionalPut>) -> Result<(), StoreError>;
}

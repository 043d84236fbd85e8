//! Store adapter: translates engine operations onto the backend primitives
//! and enforces record validity before anything is dispatched.

use std::sync::Arc;

use crate::backend::{Backend, ConditionalPut, PutCondition};
use crate::error::StoreError;
use crate::record::{Record, STATE_SORT_KEY, partition_key};

/// Per-transaction item ceiling of DynamoDB-compatible backends.
///
/// A commit writes `1 + inbound + outbound` rows; the adapter rejects
/// anything larger before dispatch.
pub const MAX_TRANSACT_ITEMS: usize = 25;

/// Scoped access to one facet's rows.
///
/// All reads and writes go through the facet's partition keys; every
/// record in a write is checked to carry the facet name and the kind the
/// transaction layout expects.
#[derive(Clone)]
pub struct FacetStore {
    facet: String,
    backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for FacetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacetStore")
            .field("facet", &self.facet)
            .finish()
    }
}

impl FacetStore {
    /// Bind a facet name to a backend.
    pub fn new(facet: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            facet: facet.into(),
            backend,
        }
    }

    /// The facet this store is scoped to.
    pub fn facet(&self) -> &str {
        &self.facet
    }

    /// Consistent point read of an entity's state row.
    ///
    /// Returns `None` for an entity that has never committed.
    pub async fn get_state(&self, id: &str) -> Result<Option<Record>, StoreError> {
        self.backend
            .get_item(&partition_key(&self.facet, id), STATE_SORT_KEY)
            .await
    }

    /// Consistent range scan of every row of an entity.
    pub async fn get_records(&self, id: &str) -> Result<Vec<Record>, StoreError> {
        self.backend
            .query_partition(&partition_key(&self.facet, id))
            .await
    }

    /// Atomically write a commit: the state row plus its inbound and
    /// outbound rows.
    ///
    /// Inbound and outbound rows are guarded by a must-not-exist predicate;
    /// the state row by "absent, or sequence equals `previous_seq`". Either
    /// the whole commit lands or nothing does.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] when any record is of the wrong kind or
    ///   a foreign facet.
    /// - [`StoreError::Capacity`] when the transaction would exceed
    ///   [`MAX_TRANSACT_ITEMS`].
    /// - [`StoreError::Concurrency`] when a predicate fails at the backend.
    pub async fn put_transaction(
        &self,
        state: Record,
        previous_seq: u64,
        inbound: Vec<Record>,
        outbound: Vec<Record>,
    ) -> Result<(), StoreError> {
        if !state.is_state() {
            return Err(StoreError::Validation(format!(
                "expected a state record, got sort key {:?}",
                state.sort_key
            )));
        }
        self.check_facet(&state)?;
        for record in &inbound {
            if !record.is_inbound() {
                return Err(StoreError::Validation(format!(
                    "expected an inbound record, got sort key {:?}",
                    record.sort_key
                )));
            }
            self.check_facet(record)?;
        }
        for record in &outbound {
            if !record.is_outbound() {
                return Err(StoreError::Validation(format!(
                    "expected an outbound record, got sort key {:?}",
                    record.sort_key
                )));
            }
            self.check_facet(record)?;
        }

        let count = 1 + inbound.len() + outbound.len();
        if count > MAX_TRANSACT_ITEMS {
            return Err(StoreError::Capacity {
                count,
                limit: MAX_TRANSACT_ITEMS,
            });
        }

        tracing::debug!(
            facet = %self.facet,
            partition = %state.partition_key,
            previous_seq,
            state_seq = state.sequence,
            inbound = inbound.len(),
            outbound = outbound.len(),
            "dispatching transactional write"
        );

        let mut puts = Vec::with_capacity(count);
        for record in inbound.into_iter().chain(outbound) {
            puts.push(ConditionalPut::new(record, PutCondition::NotExists));
        }
        puts.push(ConditionalPut::new(
            state,
            PutCondition::NotExistsOrSeqEquals(previous_seq),
        ));
        self.backend.transact_write(puts).await
    }

    fn check_facet(&self, record: &Record) -> Result<(), StoreError> {
        if record.is_facet(&self.facet) {
            Ok(())
        } else {
            Err(StoreError::Validation(format!(
                "record of facet {:?} in a {:?} transaction",
                record.facet, self.facet
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::record::Timestamp;

    fn store() -> (FacetStore, MemoryBackend) {
        let backend = MemoryBackend::new();
        (
            FacetStore::new("account", Arc::new(backend.clone())),
            backend,
        )
    }

    fn state(seq: u64) -> Record {
        Record::state("account", "a-1", seq, "{}".into(), &Timestamp::now())
    }

    fn inbound(seq: u64) -> Record {
        Record::inbound(
            "account",
            "a-1",
            seq,
            "Deposited",
            "{}".into(),
            &Timestamp::now(),
        )
    }

    fn outbound(seq: u64, index: u64) -> Record {
        Record::outbound(
            "account",
            "a-1",
            seq,
            index,
            "Notified",
            "{}".into(),
            &Timestamp::now(),
        )
    }

    #[tokio::test]
    async fn get_state_absent_returns_none() {
        let (store, _) = store();
        let found = store.get_state("a-1").await.expect("get should succeed");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn commit_then_read_back() {
        let (store, _) = store();
        store
            .put_transaction(state(1), 0, vec![inbound(1)], vec![outbound(1, 0)])
            .await
            .expect("commit should succeed");

        let found = store
            .get_state("a-1")
            .await
            .expect("get should succeed")
            .expect("state should exist");
        assert_eq!(found.sequence, 1);

        let rows = store.get_records("a-1").await.expect("scan should succeed");
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn rejects_non_state_in_state_position() {
        let (store, _) = store();
        let err = store
            .put_transaction(inbound(1), 0, vec![], vec![])
            .await
            .expect_err("inbound row in state position must fail");
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_wrong_kind_in_inbound_position() {
        let (store, _) = store();
        let err = store
            .put_transaction(state(1), 0, vec![outbound(1, 0)], vec![])
            .await
            .expect_err("outbound row in inbound position must fail");
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_wrong_kind_in_outbound_position() {
        let (store, _) = store();
        let err = store
            .put_transaction(state(1), 0, vec![], vec![inbound(1)])
            .await
            .expect_err("inbound row in outbound position must fail");
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_foreign_facet() {
        let (store, _) = store();
        let foreign = Record::state("order", "a-1", 1, "{}".into(), &Timestamp::now());
        let err = store
            .put_transaction(foreign, 0, vec![], vec![])
            .await
            .expect_err("foreign facet must fail");
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn rejects_oversized_transaction() {
        let (store, _) = store();
        let inbounds: Vec<Record> = (1..=25u64).map(inbound).collect();
        let err = store
            .put_transaction(state(25), 0, inbounds, vec![])
            .await
            .expect_err("26 items must exceed the ceiling");
        assert!(matches!(
            err,
            StoreError::Capacity {
                count: 26,
                limit: 25
            }
        ));
    }

    #[tokio::test]
    async fn validation_failure_dispatches_nothing() {
        let (store, backend) = store();
        let _ = store
            .put_transaction(state(1), 0, vec![outbound(1, 0)], vec![])
            .await
            .expect_err("validation should fail");

        let rows = backend
            .query_partition("account/a-1")
            .await
            .expect("query should succeed");
        assert!(rows.is_empty(), "nothing may reach the backend");
    }

    #[tokio::test]
    async fn stale_previous_seq_is_a_concurrency_error() {
        let (store, _) = store();
        store
            .put_transaction(state(1), 0, vec![inbound(1)], vec![])
            .await
            .expect("first commit should succeed");

        let err = store
            .put_transaction(state(2), 0, vec![inbound(2)], vec![])
            .await
            .expect_err("stale previous_seq must conflict");
        assert!(err.is_retryable());
    }
}

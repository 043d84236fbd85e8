//! In-process reference backend with genuine transactional semantics and a
//! change feed.
//!
//! Rows live in a `BTreeMap` keyed by `(partition, sort)`, so a partition
//! scan is a contiguous range walk. All condition checks and writes of a
//! transaction happen under one lock acquisition, which gives the
//! all-or-nothing behavior the [`Backend`] contract requires. Committed
//! rows are published on a broadcast channel in write order; the forwarder
//! consumes that feed the way a production deployment tails its table's
//! change stream.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::backend::{Backend, ConditionalPut, PutCondition};
use crate::error::StoreError;
use crate::record::Record;

type Rows = BTreeMap<(String, String), Record>;

/// Buffered change-feed capacity before slow subscribers start lagging.
const FEED_CAPACITY: usize = 1024;

/// An in-memory [`Backend`] for tests, demos, and embedded use.
///
/// Cloning shares the underlying table. The lock is a `std::sync::Mutex`
/// held only for the brief map operations and never across an `.await`
/// point.
#[derive(Clone)]
pub struct MemoryBackend {
    rows: Arc<Mutex<Rows>>,
    feed: broadcast::Sender<Record>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.rows.lock().map(|rows| rows.len()).unwrap_or(0);
        f.debug_struct("MemoryBackend").field("rows", &len).finish()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            rows: Arc::new(Mutex::new(BTreeMap::new())),
            feed,
        }
    }

    /// Subscribe to the change feed.
    ///
    /// Every committed put is delivered in write order. Within one
    /// transaction, rows arrive in the order they were passed to
    /// [`transact_write`](Backend::transact_write).
    pub fn subscribe(&self) -> broadcast::Receiver<Record> {
        self.feed.subscribe()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Rows>, StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::backend("backend lock poisoned"))
    }
}

fn key(record: &Record) -> (String, String) {
    (record.partition_key.clone(), record.sort_key.clone())
}

fn condition_holds(existing: Option<&Record>, condition: PutCondition) -> bool {
    match (existing, condition) {
        (None, _) => true,
        (Some(_), PutCondition::NotExists) => false,
        (Some(row), PutCondition::NotExistsOrSeqEquals(seq)) => row.sequence == seq,
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_item(&self, partition: &str, sort: &str) -> Result<Option<Record>, StoreError> {
        let rows = self.lock()?;
        Ok(rows.get(&(partition.to_string(), sort.to_string())).cloned())
    }

    async fn query_partition(&self, partition: &str) -> Result<Vec<Record>, StoreError> {
        let rows = self.lock()?;
        let start = Bound::Included((partition.to_string(), String::new()));
        Ok(rows
            .range((start, Bound::Unbounded))
            .take_while(|((pk, _), _)| pk == partition)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn transact_write(&self, puts: Vec<ConditionalPut>) -> Result<(), StoreError> {
        // A transaction may touch each row at most once; two puts on the
        // same key would make the outcome depend on batch order.
        let mut keys = HashSet::with_capacity(puts.len());
        for put in &puts {
            if !keys.insert(key(&put.record)) {
                return Err(StoreError::Validation(format!(
                    "duplicate row {}/{} in one transaction",
                    put.record.partition_key, put.record.sort_key
                )));
            }
        }

        let mut rows = self.lock()?;

        // Check every predicate before touching the map, so a failure
        // leaves the table exactly as it was.
        for put in &puts {
            if !condition_holds(rows.get(&key(&put.record)), put.condition) {
                return Err(StoreError::Concurrency {
                    partition: put.record.partition_key.clone(),
                });
            }
        }

        for put in puts {
            rows.insert(key(&put.record), put.record.clone());
            // Nobody subscribed is fine; the feed is best-effort.
            let _ = self.feed.send(put.record);
        }
        Ok(())
    }
}

//! Change-feed consumer that republishes outbound records downstream.
//!
//! The engine only enqueues outbound rows; delivery happens by tailing the
//! backend's change feed. The forwarder filters records by the outbound
//! sort-key prefix and hands the event type plus serialized payload to an
//! [`EventSink`]. Within one commit, rows arrive with the same sequence
//! and rising index, so delivery order matches publish order.

use async_trait::async_trait;

use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::record::Record;

/// Destination for forwarded outbound events (a message bus, a queue, a
/// test collector).
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one outbound event: its type name and serialized payload.
    async fn deliver(&self, event_type: &str, payload: &str) -> Result<(), StoreError>;
}

/// Pump from a change feed into an [`EventSink`], forwarding only
/// outbound records.
pub struct ChangeFeedForwarder<K> {
    sink: K,
}

impl<K: EventSink> ChangeFeedForwarder<K> {
    /// Wrap a sink.
    pub fn new(sink: K) -> Self {
        Self { sink }
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Forward everything currently buffered on the feed, then return the
    /// number of records delivered.
    ///
    /// Non-outbound records are skipped. A lag on the feed is logged and
    /// skipped over.
    pub async fn drain(&self, feed: &mut broadcast::Receiver<Record>) -> Result<usize, StoreError> {
        let mut delivered = 0;
        loop {
            match feed.try_recv() {
                Ok(record) => {
                    if self.forward(record).await? {
                        delivered += 1;
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change feed lagged, records dropped");
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return Ok(delivered),
            }
        }
    }

    /// Run until the feed closes, forwarding outbound records as they
    /// arrive.
    pub async fn run(&self, mut feed: broadcast::Receiver<Record>) -> Result<(), StoreError> {
        loop {
            match feed.recv().await {
                Ok(record) => {
                    let _ = self.forward(record).await?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change feed lagged, records dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Forward one record if it is outbound. Returns whether it was
    /// delivered.
    async fn forward(&self, record: Record) -> Result<bool, StoreError> {
        if !record.is_outbound() {
            return Ok(false);
        }
        tracing::debug!(
            partition = %record.partition_key,
            sort = %record.sort_key,
            event_type = %record.event_type,
            seq = record.sequence,
            "forwarding outbound record"
        );
        self.sink.deliver(&record.event_type, &record.payload).await?;
        Ok(true)
    }
}

/// An [`EventSink`] that collects deliveries in memory.
///
/// Useful in tests and demos to observe what a bus would have received.
#[derive(Debug, Default)]
pub struct CollectingSink {
    delivered: std::sync::Mutex<Vec<(String, String)>>,
}

impl CollectingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `(event_type, payload)` pairs delivered so far.
    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn deliver(&self, event_type: &str, payload: &str) -> Result<(), StoreError> {
        self.delivered
            .lock()
            .map_err(|_| StoreError::backend("sink lock poisoned"))?
            .push((event_type.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, ConditionalPut, PutCondition};
    use crate::memory::MemoryBackend;
    use crate::record::Timestamp;

    fn outbound(seq: u64, index: u64, event_type: &str) -> Record {
        Record::outbound(
            "account",
            "a-1",
            seq,
            index,
            event_type,
            format!("{{\"n\":{index}}}"),
            &Timestamp::now(),
        )
    }

    #[tokio::test]
    async fn drains_only_outbound_records() {
        let backend = MemoryBackend::new();
        let mut feed = backend.subscribe();

        let ts = Timestamp::now();
        backend
            .transact_write(vec![
                ConditionalPut::new(
                    Record::inbound("account", "a-1", 1, "Deposited", "{}".into(), &ts),
                    PutCondition::NotExists,
                ),
                ConditionalPut::new(outbound(1, 0, "Notified"), PutCondition::NotExists),
                ConditionalPut::new(
                    Record::state("account", "a-1", 1, "{}".into(), &ts),
                    PutCondition::NotExists,
                ),
            ])
            .await
            .expect("write should succeed");

        let forwarder = ChangeFeedForwarder::new(CollectingSink::new());
        let delivered = forwarder
            .drain(&mut feed)
            .await
            .expect("drain should succeed");

        assert_eq!(delivered, 1, "state and inbound rows are filtered out");
        let seen = forwarder.sink().delivered();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "Notified");
        assert_eq!(seen[0].1, "{\"n\":0}");
    }

    #[tokio::test]
    async fn preserves_within_commit_order() {
        let backend = MemoryBackend::new();
        let mut feed = backend.subscribe();

        backend
            .transact_write(vec![
                ConditionalPut::new(outbound(1, 0, "First"), PutCondition::NotExists),
                ConditionalPut::new(outbound(1, 1, "Second"), PutCondition::NotExists),
                ConditionalPut::new(outbound(1, 2, "Third"), PutCondition::NotExists),
            ])
            .await
            .expect("write should succeed");

        let forwarder = ChangeFeedForwarder::new(CollectingSink::new());
        forwarder
            .drain(&mut feed)
            .await
            .expect("drain should succeed");

        let types: Vec<String> = forwarder
            .sink()
            .delivered()
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(types, vec!["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn drain_on_empty_feed_returns_zero() {
        let backend = MemoryBackend::new();
        let mut feed = backend.subscribe();

        let forwarder = ChangeFeedForwarder::new(CollectingSink::new());
        let delivered = forwarder
            .drain(&mut feed)
            .await
            .expect("drain should succeed");
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn run_stops_when_the_feed_closes() {
        let backend = MemoryBackend::new();
        let feed = backend.subscribe();

        backend
            .transact_write(vec![ConditionalPut::new(
                outbound(1, 0, "Notified"),
                PutCondition::NotExists,
            )])
            .await
            .expect("write should succeed");
        drop(backend);

        let forwarder = ChangeFeedForwarder::new(CollectingSink::new());
        forwarder.run(feed).await.expect("run should finish");
        assert_eq!(forwarder.sink().delivered().len(), 1);
    }
}

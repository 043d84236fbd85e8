//! Facet orchestrator: composes the processor and the store adapter into
//! the read/append/replay surface callers use.
//!
//! Every write operation funnels into one commit path: assign sequence
//! numbers, build records under a single timestamp, and issue the
//! conditional transactional write. Concurrent writers racing on the same
//! entity are arbitrated entirely by the state row's sequence predicate;
//! losers receive a retryable [`StoreError::Concurrency`].

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::Backend;
use crate::error::StoreError;
use crate::event::{Event, OutboundEvent, decode_event, encode_payload};
use crate::processor::{Processed, Processor};
use crate::record::{Record, Timestamp};
use crate::store::FacetStore;

/// A read hit: the raw state row plus its decoded item.
#[derive(Debug, Clone)]
pub struct FacetState<S> {
    /// The state row as persisted.
    pub record: Record,
    /// The decoded materialized item.
    pub item: S,
}

/// Result of a successful commit.
#[derive(Debug)]
pub struct ChangeOutput<S> {
    /// The committed state sequence.
    pub seq: u64,
    /// The materialized item after reduction.
    pub item: S,
    /// Outbounds re-derived from replayed history. Not persisted by this
    /// commit; returned for audits and introspection.
    pub past_outbound: Vec<OutboundEvent>,
    /// Outbounds produced by the new events and persisted by this commit.
    pub new_outbound: Vec<OutboundEvent>,
}

/// One named family of entities sharing a state shape and rule set.
///
/// `S` is the materialized state, `E` the inbound payload type. The facet
/// holds no mutable state of its own; calls are independent and may run
/// concurrently from many tasks.
pub struct Facet<S, E> {
    store: FacetStore,
    processor: Processor<S, E>,
}

impl<S, E> std::fmt::Debug for Facet<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facet")
            .field("name", &self.store.facet())
            .field("processor", &self.processor)
            .finish()
    }
}

impl<S, E> Facet<S, E>
where
    S: Serialize + DeserializeOwned + Send + Sync,
    E: Serialize + DeserializeOwned + Send + Sync,
{
    /// Bind a facet name, a backend, and a processor.
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn Backend>,
        processor: Processor<S, E>,
    ) -> Self {
        Self {
            store: FacetStore::new(name, backend),
            processor,
        }
    }

    /// The facet name.
    pub fn name(&self) -> &str {
        self.store.facet()
    }

    /// The underlying store adapter, for introspection of raw rows.
    pub fn store(&self) -> &FacetStore {
        &self.store
    }

    /// Read an entity's current state. Returns `None` for an entity that
    /// has never committed.
    pub async fn get(&self, id: &str) -> Result<Option<FacetState<S>>, StoreError> {
        match self.store.get_state(id).await? {
            None => Ok(None),
            Some(record) => {
                let item = serde_json::from_str(&record.payload)?;
                Ok(Some(FacetState { record, item }))
            }
        }
    }

    /// Append new events to an entity, reading its current state first.
    ///
    /// Reduces the new events on top of the stored item (or the
    /// initializer for a fresh entity) and commits state + inbound +
    /// outbound rows atomically.
    ///
    /// Zero events against an *existing* entity rewrite the state row at
    /// its current sequence. An entity only comes into existence through a
    /// commit that appends at least one event, so zero events against a
    /// missing entity are rejected rather than materializing a state row
    /// with no history behind it.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] when `events` is empty and the entity
    ///   does not exist.
    /// - [`StoreError::Concurrency`] when another writer committed in
    ///   between; the usual recovery is to re-`append` (which re-reads) or
    ///   fall back to [`recalculate`](Facet::recalculate).
    pub async fn append(
        &self,
        id: &str,
        events: Vec<Event<E>>,
    ) -> Result<ChangeOutput<S>, StoreError> {
        let (state, previous_seq) = match self.store.get_state(id).await? {
            Some(record) => (Some(serde_json::from_str(&record.payload)?), record.sequence),
            None => (None, 0),
        };
        if state.is_none() && events.is_empty() {
            return Err(StoreError::Validation(format!(
                "entity {id:?} does not exist; creating it takes at least one event"
            )));
        }
        let processed = self.processor.process(state, &[], &events);
        self.commit(id, processed, previous_seq, &events).await
    }

    /// Append new events on top of a caller-supplied state and sequence,
    /// skipping the read.
    ///
    /// The fast path after a recent [`get`](Facet::get): the caller vouches
    /// for `state` and `seq`. A stale `seq` cannot corrupt anything; it
    /// surfaces as a retryable [`StoreError::Concurrency`] at commit.
    pub async fn append_to(
        &self,
        id: &str,
        state: S,
        seq: u64,
        events: Vec<Event<E>>,
    ) -> Result<ChangeOutput<S>, StoreError> {
        let processed = self.processor.process(Some(state), &[], &events);
        self.commit(id, processed, seq, &events).await
    }

    /// Re-derive an entity's state from its full inbound log, then append
    /// new events.
    ///
    /// Reads every row of the entity, sorts the inbound log by sequence
    /// (stable, ties broken by sort key), and reduces from the initializer
    /// over past ++ new. Rows of unknown kind are ignored. Outbounds
    /// re-derived from history are returned in `past_outbound` but never
    /// written again.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] when `events` is empty and the entity has
    /// no rows at all: there is nothing to replay and nothing to create it
    /// with. Replaying an entity that has inbound rows but no state row is
    /// allowed; the state re-materializes at the last sequence the state
    /// row recorded.
    pub async fn recalculate(
        &self,
        id: &str,
        events: Vec<Event<E>>,
    ) -> Result<ChangeOutput<S>, StoreError> {
        let records = self.store.get_records(id).await?;
        if records.is_empty() && events.is_empty() {
            return Err(StoreError::Validation(format!(
                "entity {id:?} has no rows and no events were given"
            )));
        }

        let mut previous_seq = 0;
        let mut inbound_rows = Vec::new();
        for record in records {
            if record.is_state() {
                previous_seq = record.sequence;
            } else if record.is_inbound() {
                inbound_rows.push(record);
            }
        }
        // The store returns sort-key order, which is lexicographic on the
        // sequence component. Replay needs numeric order.
        inbound_rows.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.sort_key.cmp(&b.sort_key))
        });

        let past = inbound_rows
            .iter()
            .map(decode_event)
            .collect::<Result<Vec<Event<E>>, _>>()?;

        tracing::debug!(
            facet = %self.store.facet(),
            id,
            replayed = past.len(),
            appended = events.len(),
            "recalculating from the inbound log"
        );

        let processed = self.processor.process(None, &past, &events);
        self.commit(id, processed, previous_seq, &events).await
    }

    /// Shared commit path.
    ///
    /// Sequences: the i-th new event gets `previous_seq + 1 + i`; the
    /// state lands at `previous_seq + events.len()`. With zero new events
    /// the state row is rewritten at `previous_seq` under the same
    /// predicate. One timestamp covers the whole commit.
    async fn commit(
        &self,
        id: &str,
        processed: Processed<S>,
        previous_seq: u64,
        events: &[Event<E>],
    ) -> Result<ChangeOutput<S>, StoreError> {
        let facet = self.store.facet().to_string();
        let ts = Timestamp::now();
        let state_seq = previous_seq + events.len() as u64;

        let state_record =
            Record::state(&facet, id, state_seq, encode_payload(&processed.state)?, &ts);

        let inbound = events
            .iter()
            .enumerate()
            .map(|(i, event)| {
                Ok(Record::inbound(
                    &facet,
                    id,
                    previous_seq + 1 + i as u64,
                    &event.event_type,
                    encode_payload(&event.payload)?,
                    &ts,
                ))
            })
            .collect::<Result<Vec<Record>, StoreError>>()?;

        let outbound = processed
            .new_outbound
            .iter()
            .enumerate()
            .map(|(index, event)| {
                Ok(Record::outbound(
                    &facet,
                    id,
                    state_seq,
                    index as u64,
                    &event.event_type,
                    encode_payload(&event.payload)?,
                    &ts,
                ))
            })
            .collect::<Result<Vec<Record>, StoreError>>()?;

        self.store
            .put_transaction(state_record, previous_seq, inbound, outbound)
            .await?;

        tracing::debug!(
            facet = %facet,
            id,
            seq = state_seq,
            outbound = processed.new_outbound.len(),
            "commit applied"
        );

        Ok(ChangeOutput {
            seq: state_seq,
            item: processed.state,
            past_outbound: processed.past_outbound,
            new_outbound: processed.new_outbound,
        })
    }
}

//! Per-entity event sourcing on a transactional composite-key KV backend.
//!
//! `facetstore` persists, for each entity of a named facet, a materialized
//! state record, the full ordered log of inbound events that produced it,
//! and outbound event records queued for downstream delivery. All three
//! are written in a single conditional multi-item transaction, so the
//! change stream can never diverge from durable state.
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`Facet`] | Orchestrator: `get`, `append`, `append_to`, `recalculate` |
//! | [`Processor`] | Pure reducer: rule table keyed by event type |
//! | [`Event`] | In-memory event envelope (type tag + typed payload) |
//! | [`Record`] | One persisted row: state, inbound, or outbound |
//! | [`Backend`] | Transactional KV seam: point get, range query, conditional multi-put |
//! | [`MemoryBackend`] | In-process reference backend with a change feed |
//! | [`ChangeFeedForwarder`] | Tails the change feed, republishes outbound records |
//!
//! # Concurrency
//!
//! Writers racing on one entity are arbitrated by a conditional predicate
//! on the state row's sequence: exactly one commit wins per sequence
//! number, losers receive a retryable [`StoreError::Concurrency`]. The
//! library holds no locks and no shared mutable state beyond the backend
//! handle.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use facetstore::{Event, Facet, MemoryBackend, Processor, ReducerInput};
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Account {
//!     balance: i64,
//! }
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Deposit {
//!     amount: i64,
//! }
//!
//! # async fn run() -> Result<(), facetstore::StoreError> {
//! let processor = Processor::builder()
//!     .rule("Deposited", |mut input: ReducerInput<'_, Account, Deposit>| {
//!         let amount = input.current.amount;
//!         input.publish("BalanceChanged", json!({ "delta": amount }));
//!         let mut account = input.state;
//!         account.balance += amount;
//!         account
//!     })
//!     .build();
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let accounts = Facet::new("account", backend, processor);
//!
//! let change = accounts
//!     .append("a-1", vec![Event::new("Deposited", Deposit { amount: 25 })])
//!     .await?;
//! assert_eq!(change.seq, 1);
//! assert_eq!(change.item.balance, 25);
//! # Ok(())
//! # }
//! ```
//!
//! See `demos/account.rs` for a self-contained runnable example that also
//! wires the change-feed forwarder.

mod backend;
mod error;
mod event;
mod facet;
mod forwarder;
mod memory;
mod processor;
mod record;
mod store;

pub use backend::{Backend, ConditionalPut, PutCondition};
pub use error::StoreError;
pub use event::{Event, OutboundEvent};
pub use facet::{ChangeOutput, Facet, FacetState};
pub use forwarder::{ChangeFeedForwarder, CollectingSink, EventSink};
pub use memory::MemoryBackend;
pub use processor::{Processed, Processor, ProcessorBuilder, Reducer, ReducerInput};
pub use record::{
    INBOUND_PREFIX, OUTBOUND_PREFIX, Record, STATE_SORT_KEY, Timestamp, partition_key,
};
pub use store::{FacetStore, MAX_TRANSACT_ITEMS};

//! In-memory event envelope and the codec between domain events and
//! persisted records.
//!
//! Payloads are typed in memory and opaque JSON strings at the store
//! boundary (`_itm`). Encoding happens once per commit; decoding recovers
//! the event type from the record's type field rather than re-parsing the
//! sort key.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::record::Record;

/// An event envelope pairing a type tag with a typed payload.
///
/// The type tag drives rule dispatch in the processor; the payload is
/// whatever the rule for that type expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<E> {
    /// Event type name (e.g. `"Deposited"`).
    pub event_type: String,
    /// Typed payload.
    pub payload: E,
}

impl<E> Event<E> {
    /// Build an event envelope.
    pub fn new(event_type: impl Into<String>, payload: E) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// An event emitted by a reducer for downstream delivery.
///
/// Outbound payloads are JSON values rather than a caller type: a single
/// commit may publish events of many shapes, and the change-feed contract
/// forwards them as serialized payloads anyway.
pub type OutboundEvent = Event<serde_json::Value>;

/// Decode an event row back into a typed envelope.
///
/// The event type comes from the record's type field; the payload is parsed
/// from the serialized `_itm` string.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the payload does not parse as
/// `E`.
pub(crate) fn decode_event<E: DeserializeOwned>(record: &Record) -> Result<Event<E>, StoreError> {
    let payload = serde_json::from_str(&record.payload)?;
    Ok(Event {
        event_type: record.event_type.clone(),
        payload,
    })
}

/// Encode a payload into its persisted JSON-string form.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the payload cannot be
/// serialized.
pub(crate) fn encode_payload<P: Serialize>(payload: &P) -> Result<String, StoreError> {
    Ok(serde_json::to_string(payload)?)
}

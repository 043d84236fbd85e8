//! Persisted record model: one row per state, inbound, or outbound entry.
//!
//! Every row of an entity lives under the same partition key
//! `"<facet>/<id>"`. The sort key discriminates the three record kinds:
//!
//! ```text
//! STATE                              the materialized item (at most one)
//! INBOUND/<type>/<seq>               one row per accepted inbound event
//! OUTBOUND/<type>/<seq>/<index>      one row per outbound event emitted
//! ```
//!
//! Attribute names follow the backend schema (`_id`, `_rng`, `_facet`,
//! `_typ`, `_ts`, `_date`, `_itm`, `_seq`) so range scans and change-feed
//! consumers can filter on the raw wire shape.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Sort key of the unique state row.
pub const STATE_SORT_KEY: &str = "STATE";

/// Sort-key prefix of inbound event rows.
pub const INBOUND_PREFIX: &str = "INBOUND/";

/// Sort-key prefix of outbound event rows.
pub const OUTBOUND_PREFIX: &str = "OUTBOUND/";

/// Build the partition key shared by every row of an entity.
pub fn partition_key(facet: &str, id: &str) -> String {
    format!("{facet}/{id}")
}

/// Capture moment of a commit: epoch milliseconds plus the RFC 3339 form.
///
/// A single `Timestamp` is taken per commit and stamped on every record in
/// that commit, so the state row and its inbound/outbound rows always agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    /// Milliseconds since the Unix epoch.
    pub millis: i64,
    /// The same instant as an RFC 3339 string with millisecond precision.
    pub iso: String,
}

impl Timestamp {
    /// Capture the current instant.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            millis: now.timestamp_millis(),
            iso: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// One persisted row.
///
/// Serializes to the canonical attribute names of the backend schema, so a
/// `Record` round-trips unchanged through any store that speaks that shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Partition key: `"<facet>/<id>"`.
    #[serde(rename = "_id")]
    pub partition_key: String,
    /// Sort key; its prefix discriminates the record kind.
    #[serde(rename = "_rng")]
    pub sort_key: String,
    /// Facet name, denormalized for validation.
    #[serde(rename = "_facet")]
    pub facet: String,
    /// Event type name, or the facet name for state rows.
    #[serde(rename = "_typ")]
    pub event_type: String,
    /// Commit timestamp in epoch milliseconds.
    #[serde(rename = "_ts")]
    pub timestamp: i64,
    /// Commit timestamp as an RFC 3339 string.
    #[serde(rename = "_date")]
    pub date: String,
    /// Serialized payload (JSON string of the item or event).
    #[serde(rename = "_itm")]
    pub payload: String,
    /// Per-entity sequence number of the commit this row belongs to.
    #[serde(rename = "_seq")]
    pub sequence: u64,
}

impl Record {
    /// Build the state row of an entity at the given sequence.
    ///
    /// The type field of a state row carries the facet name.
    pub fn state(facet: &str, id: &str, sequence: u64, payload: String, ts: &Timestamp) -> Self {
        Self {
            partition_key: partition_key(facet, id),
            sort_key: STATE_SORT_KEY.to_string(),
            facet: facet.to_string(),
            event_type: facet.to_string(),
            timestamp: ts.millis,
            date: ts.iso.clone(),
            payload,
            sequence,
        }
    }

    /// Build an inbound event row at the given sequence.
    pub fn inbound(
        facet: &str,
        id: &str,
        sequence: u64,
        event_type: &str,
        payload: String,
        ts: &Timestamp,
    ) -> Self {
        Self {
            partition_key: partition_key(facet, id),
            sort_key: format!("{INBOUND_PREFIX}{event_type}/{sequence}"),
            facet: facet.to_string(),
            event_type: event_type.to_string(),
            timestamp: ts.millis,
            date: ts.iso.clone(),
            payload,
            sequence,
        }
    }

    /// Build an outbound event row.
    ///
    /// All outbounds of a commit share the commit's sequence; `index` rises
    /// from zero within the commit and keeps their sort keys unique.
    pub fn outbound(
        facet: &str,
        id: &str,
        sequence: u64,
        index: u64,
        event_type: &str,
        payload: String,
        ts: &Timestamp,
    ) -> Self {
        Self {
            partition_key: partition_key(facet, id),
            sort_key: format!("{OUTBOUND_PREFIX}{event_type}/{sequence}/{index}"),
            facet: facet.to_string(),
            event_type: event_type.to_string(),
            timestamp: ts.millis,
            date: ts.iso.clone(),
            payload,
            sequence,
        }
    }

    /// Whether this is the state row.
    pub fn is_state(&self) -> bool {
        self.sort_key == STATE_SORT_KEY
    }

    /// Whether this is an inbound event row.
    pub fn is_inbound(&self) -> bool {
        self.sort_key.starts_with(INBOUND_PREFIX)
    }

    /// Whether this is an outbound event row.
    pub fn is_outbound(&self) -> bool {
        self.sort_key.starts_with(OUTBOUND_PREFIX)
    }

    /// Whether this row belongs to the named facet.
    pub fn is_facet(&self, facet: &str) -> bool {
        self.facet == facet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> Timestamp {
        Timestamp {
            millis: 1_700_000_000_000,
            iso: "2023-11-14T22:13:20.000Z".to_string(),
        }
    }

    #[test]
    fn state_row_shape() {
        let r = Record::state("account", "a-1", 3, "{\"balance\":5}".into(), &ts());
        assert_eq!(r.partition_key, "account/a-1");
        assert_eq!(r.sort_key, "STATE");
        assert_eq!(r.facet, "account");
        assert_eq!(r.event_type, "account", "state rows carry the facet name as type");
        assert_eq!(r.sequence, 3);
        assert_eq!(r.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn inbound_sort_key_embeds_type_and_sequence() {
        let r = Record::inbound("account", "a-1", 7, "Deposited", "{}".into(), &ts());
        assert_eq!(r.sort_key, "INBOUND/Deposited/7");
        assert_eq!(r.event_type, "Deposited");
        assert_eq!(r.sequence, 7);
    }

    #[test]
    fn outbound_sort_key_embeds_index() {
        let a = Record::outbound("account", "a-1", 7, 0, "Notified", "{}".into(), &ts());
        let b = Record::outbound("account", "a-1", 7, 1, "Notified", "{}".into(), &ts());
        assert_eq!(a.sort_key, "OUTBOUND/Notified/7/0");
        assert_eq!(b.sort_key, "OUTBOUND/Notified/7/1");
        assert_ne!(a.sort_key, b.sort_key, "index keeps same-sequence outbounds unique");
    }

    #[test]
    fn discriminators_by_prefix() {
        let s = Record::state("account", "a-1", 1, "{}".into(), &ts());
        let i = Record::inbound("account", "a-1", 1, "Deposited", "{}".into(), &ts());
        let o = Record::outbound("account", "a-1", 1, 0, "Notified", "{}".into(), &ts());

        assert!(s.is_state() && !s.is_inbound() && !s.is_outbound());
        assert!(i.is_inbound() && !i.is_state() && !i.is_outbound());
        assert!(o.is_outbound() && !o.is_state() && !o.is_inbound());
    }

    #[test]
    fn is_facet_checks_the_denormalized_field() {
        let r = Record::state("account", "a-1", 1, "{}".into(), &ts());
        assert!(r.is_facet("account"));
        assert!(!r.is_facet("order"));
    }

    #[test]
    fn serializes_to_canonical_attribute_names() {
        let r = Record::inbound("account", "a-1", 2, "Deposited", "{\"amount\":5}".into(), &ts());
        let value = serde_json::to_value(&r).expect("serialize should succeed");

        assert_eq!(value["_id"], "account/a-1");
        assert_eq!(value["_rng"], "INBOUND/Deposited/2");
        assert_eq!(value["_facet"], "account");
        assert_eq!(value["_typ"], "Deposited");
        assert_eq!(value["_ts"], 1_700_000_000_000_i64);
        assert_eq!(value["_date"], "2023-11-14T22:13:20.000Z");
        assert_eq!(value["_itm"], "{\"amount\":5}");
        assert_eq!(value["_seq"], 2);
    }

    #[test]
    fn record_roundtrips_through_wire_shape() {
        let r = Record::outbound("account", "a-1", 4, 1, "Notified", "{}".into(), &ts());
        let json = serde_json::to_string(&r).expect("serialize should succeed");
        let back: Record = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(back, r);
    }

    #[test]
    fn timestamp_now_is_consistent() {
        let t = Timestamp::now();
        assert!(t.millis > 1_700_000_000_000, "epoch millis, not seconds");
        let parsed = chrono::DateTime::parse_from_rfc3339(&t.iso).expect("valid RFC 3339");
        assert_eq!(parsed.timestamp_millis(), t.millis);
    }
}

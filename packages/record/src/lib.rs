#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Payload flattening and partition-key expansion.
//!
//! A resolved NPI payload is a JSON object. Two pure views of it feed the
//! output stage:
//!
//! - [`partition_keys`] derives the set of US-state partition keys from the
//!   payload's affiliated practices, falling back to [`UNKNOWN_PARTITION`].
//! - [`flatten`] expands the nested payload into an ordered list of
//!   `path → scalar` columns suitable for a CSV row.

use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Partition key for payloads with no derivable practice state.
pub const UNKNOWN_PARTITION: &str = "unknown";

/// Partition key for identifiers whose lookup exhausted all retries.
pub const FAILED_PARTITION: &str = "failed";

/// The two-letter codes of the 50 US states.
pub const STATE_CODES: [&str; 50] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA", "KS",
    "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ", "NM", "NY",
    "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA", "WV",
    "WI", "WY",
];

/// Returns every partition key a run can produce: the 50 state codes plus
/// the [`UNKNOWN_PARTITION`] and [`FAILED_PARTITION`] sentinels.
///
/// No single payload yields more than a handful of these, but the writer
/// provisions a lock for each up front.
pub fn partition_universe() -> impl Iterator<Item = &'static str> {
    STATE_CODES
        .into_iter()
        .chain([UNKNOWN_PARTITION, FAILED_PARTITION])
}

/// Computes the set of partition keys a payload belongs to.
///
/// Each entry of `affiliatedPractices.items` contributes its
/// `address.state` value; an item without a state contributes
/// [`UNKNOWN_PARTITION`]. A payload with no items at all maps to
/// `{unknown}`. The result is never empty, and duplicate states across
/// items collapse — the record is written once per distinct key.
#[must_use]
pub fn partition_keys(payload: &serde_json::Map<String, serde_json::Value>) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();

    let items = payload
        .get("affiliatedPractices")
        .and_then(|practices| practices.get("items"))
        .and_then(serde_json::Value::as_array);

    match items {
        Some(items) if !items.is_empty() => {
            for item in items {
                let state = item
                    .get("address")
                    .and_then(|address| address.get("state"))
                    .and_then(serde_json::Value::as_str);
                keys.insert(state.unwrap_or(UNKNOWN_PARTITION).to_owned());
            }
        }
        _ => {
            keys.insert(UNKNOWN_PARTITION.to_owned());
        }
    }

    keys
}

/// An ordered `field path → scalar value` view of a payload, ready to be
/// written as one CSV row (with the paths as the header).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRecord {
    columns: Vec<(String, String)>,
}

impl FlatRecord {
    /// Creates a record with a single column. Used for the failed
    /// partition, where the only column is the identifier itself.
    #[must_use]
    pub fn single(field: &str, value: &str) -> Self {
        Self {
            columns: vec![(field.to_owned(), value.to_owned())],
        }
    }

    /// The field paths, in flattening order. These form the header row.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(field, _)| field.as_str())
    }

    /// The scalar values, in the same order as [`fields`](Self::fields).
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(_, value)| value.as_str())
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the record has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Looks up a value by its full field path.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(candidate, _)| candidate == field)
            .map(|(_, value)| value.as_str())
    }
}

/// Flattens a payload into an ordered [`FlatRecord`].
///
/// Nested object keys extend the path as `parent.key`; array elements as
/// `parent[index]`. Recursion stops at scalars. Column order is the
/// pre-order traversal of the payload's key/element order, so the same
/// payload shape always yields the same header.
#[must_use]
pub fn flatten(payload: &serde_json::Map<String, serde_json::Value>) -> FlatRecord {
    let mut columns = Vec::new();
    for (key, value) in payload {
        flatten_into(key.clone(), value, &mut columns);
    }
    FlatRecord { columns }
}

/// Recursive helper for [`flatten`]: appends `(path, scalar)` pairs for the
/// subtree rooted at `value`.
fn flatten_into(path: String, value: &serde_json::Value, columns: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                flatten_into(format!("{path}.{key}"), child, columns);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let mut child_path = path.clone();
                write!(child_path, "[{index}]").unwrap();
                flatten_into(child_path, child, columns);
            }
        }
        scalar => columns.push((path, scalar_to_string(scalar))),
    }
}

/// Renders a scalar JSON value as CSV cell text. Null becomes the empty
/// string; strings are unquoted.
fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().expect("fixture must be an object").clone()
    }

    #[test]
    fn duplicate_states_collapse() {
        let payload = object(json!({
            "affiliatedPractices": { "items": [
                { "address": { "state": "CA" } },
                { "address": { "state": "CA" } },
                { "address": { "state": "NY" } },
            ]}
        }));
        let keys = partition_keys(&payload);
        assert_eq!(
            keys,
            BTreeSet::from(["CA".to_owned(), "NY".to_owned()])
        );
    }

    #[test]
    fn null_state_maps_to_unknown() {
        let payload = object(json!({
            "affiliatedPractices": { "items": [
                { "address": { "state": null } },
                { "address": { "state": "TX" } },
            ]}
        }));
        let keys = partition_keys(&payload);
        assert_eq!(
            keys,
            BTreeSet::from(["TX".to_owned(), UNKNOWN_PARTITION.to_owned()])
        );
    }

    #[test]
    fn empty_items_maps_to_unknown() {
        let payload = object(json!({ "affiliatedPractices": { "items": [] } }));
        assert_eq!(
            partition_keys(&payload),
            BTreeSet::from([UNKNOWN_PARTITION.to_owned()])
        );
    }

    #[test]
    fn missing_collection_maps_to_unknown() {
        let payload = object(json!({ "npi": "1234567890" }));
        assert_eq!(
            partition_keys(&payload),
            BTreeSet::from([UNKNOWN_PARTITION.to_owned()])
        );
    }

    #[test]
    fn null_items_maps_to_unknown() {
        let payload = object(json!({ "affiliatedPractices": { "items": null } }));
        assert_eq!(
            partition_keys(&payload),
            BTreeSet::from([UNKNOWN_PARTITION.to_owned()])
        );
    }

    #[test]
    fn flatten_expands_nested_paths_in_order() {
        let payload = object(json!({ "a": { "b": 1, "c": [2, 3] } }));
        let record = flatten(&payload);

        let columns: Vec<(&str, &str)> = record.fields().zip(record.values()).collect();
        assert_eq!(
            columns,
            vec![("a.b", "1"), ("a.c[0]", "2"), ("a.c[1]", "3")]
        );
    }

    #[test]
    fn flatten_preserves_payload_key_order() {
        // Key order must survive parsing untouched — no alphabetical
        // re-sorting of the upstream response.
        let payload = object(json!({ "npi": "123", "name": "A. Provider" }));
        let record = flatten(&payload);
        let fields: Vec<&str> = record.fields().collect();
        assert_eq!(fields, vec!["npi", "name"]);
    }

    #[test]
    fn flatten_renders_null_as_empty() {
        let payload = object(json!({ "npi": "123", "name": null }));
        let record = flatten(&payload);
        assert_eq!(record.get("name"), Some(""));
        assert_eq!(record.get("npi"), Some("123"));
    }

    #[test]
    fn flatten_handles_objects_inside_arrays() {
        let payload = object(json!({
            "items": [ { "state": "CA" }, { "state": "NY" } ]
        }));
        let record = flatten(&payload);
        assert_eq!(record.get("items[0].state"), Some("CA"));
        assert_eq!(record.get("items[1].state"), Some("NY"));
    }

    #[test]
    fn universe_covers_states_and_sentinels() {
        let universe: Vec<&str> = partition_universe().collect();
        assert_eq!(universe.len(), 52);
        assert!(universe.contains(&"TX"));
        assert!(universe.contains(&UNKNOWN_PARTITION));
        assert!(universe.contains(&FAILED_PARTITION));
    }
}

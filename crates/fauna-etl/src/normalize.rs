//! Record normalization
//!
//! Converts one raw record with heterogeneous field encodings into the
//! canonical shape, or reports a typed validation failure. Coercion is an
//! explicit pattern match per field; nothing is coerced implicitly.
//!
//! Rules:
//! - `born_at`: a numeric value is epoch milliseconds; a string is parsed
//!   as ISO-8601, with a trailing `Z` equivalent to `+00:00` and a naive
//!   timestamp interpreted as UTC. Anything else is `BadTimestamp`.
//! - `friends`: a string is split on commas, each element trimmed, empty
//!   elements dropped; a sequence of strings passes through unchanged.
//!   Anything else is `BadRelationList`.
//! - `id`, `name`, `species` are required; absence (or a wrong type) is
//!   `MissingField`.

use crate::error::ValidationError;
use crate::models::{NormalizedRecord, RawRecord, RecordId};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Normalize one raw record into the canonical shape
pub fn normalize(raw: &RawRecord) -> Result<NormalizedRecord, ValidationError> {
    let id = match raw.get("id") {
        Some(Value::Number(n)) if n.as_i64().is_some() => {
            RecordId::Int(n.as_i64().unwrap_or_default())
        },
        Some(Value::String(s)) if !s.is_empty() => RecordId::Str(s.clone()),
        _ => return Err(ValidationError::MissingField("id".to_string())),
    };

    let name = require_string(raw, "name")?;
    let species = require_string(raw, "species")?;

    // The numeric attribute is optional; non-integer shapes are dropped
    // rather than rejected.
    let age = match raw.get("age") {
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    };

    let (friends, friends_raw) = normalize_friends(raw.get("friends"))?;
    let born_at = normalize_born_at(raw.get("born_at"))?;

    Ok(NormalizedRecord {
        id,
        name,
        species,
        age,
        friends,
        born_at,
        friends_raw,
    })
}

fn require_string(raw: &RawRecord, field: &str) -> Result<String, ValidationError> {
    match raw.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(ValidationError::MissingField(field.to_string())),
    }
}

/// Coerce the relation list, returning the canonical list plus the raw
/// string form when the upstream sent one
fn normalize_friends(
    value: Option<&Value>,
) -> Result<(Vec<String>, Option<String>), ValidationError> {
    match value {
        None | Some(Value::Null) => Ok((Vec::new(), None)),
        Some(Value::String(s)) => {
            let friends = s
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
            Ok((friends, Some(s.clone())))
        },
        Some(Value::Array(items)) => {
            let mut friends = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => friends.push(s.clone()),
                    other => {
                        return Err(ValidationError::BadRelationList(format!(
                            "non-string element: {}",
                            other
                        )))
                    },
                }
            }
            Ok((friends, None))
        },
        Some(other) => Err(ValidationError::BadRelationList(format!(
            "unexpected value: {}",
            other
        ))),
    }
}

fn normalize_born_at(value: Option<&Value>) -> Result<Option<DateTime<Utc>>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| ValidationError::BadTimestamp(n.to_string()))?;
            Utc.timestamp_millis_opt(millis)
                .single()
                .map(Some)
                .ok_or_else(|| ValidationError::BadTimestamp(n.to_string()))
        },
        Some(Value::String(s)) => parse_iso8601(s)
            .map(Some)
            .ok_or_else(|| ValidationError::BadTimestamp(s.clone())),
        Some(other) => Err(ValidationError::BadTimestamp(other.to_string())),
    }
}

/// Parse an ISO-8601 timestamp into a UTC instant
///
/// Accepts an explicit offset or a trailing `Z`; a naive timestamp with no
/// offset at all is interpreted as UTC.
fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_epoch_millis_and_comma_list_scenario() {
        let record = raw(json!({
            "id": 7,
            "name": "Rex",
            "species": "dog",
            "born_at": 1609459200000i64,
            "friends": "X, Y ,Z"
        }));

        let normalized = normalize(&record).unwrap();
        assert_eq!(normalized.id, RecordId::Int(7));
        assert_eq!(
            normalized.born_at.unwrap(),
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(normalized.friends, vec!["X", "Y", "Z"]);
        assert_eq!(normalized.friends_raw.as_deref(), Some("X, Y ,Z"));
    }

    #[test]
    fn test_friends_list_has_no_empty_or_padded_elements() {
        let record = raw(json!({
            "id": 1,
            "name": "Momo",
            "species": "cat",
            "friends": " A ,, B,  ,C "
        }));

        let normalized = normalize(&record).unwrap();
        assert_eq!(normalized.friends, vec!["A", "B", "C"]);
        for friend in &normalized.friends {
            assert!(!friend.is_empty());
            assert_eq!(friend.trim(), friend);
        }
    }

    #[test]
    fn test_friends_sequence_passes_through() {
        let record = raw(json!({
            "id": 1,
            "name": "Momo",
            "species": "cat",
            "friends": ["A", "B"]
        }));

        let normalized = normalize(&record).unwrap();
        assert_eq!(normalized.friends, vec!["A", "B"]);
        assert!(normalized.friends_raw.is_none());
    }

    #[test]
    fn test_friends_wrong_shape_is_bad_relation_list() {
        let record = raw(json!({
            "id": 1,
            "name": "Momo",
            "species": "cat",
            "friends": 42
        }));
        assert!(matches!(
            normalize(&record),
            Err(ValidationError::BadRelationList(_))
        ));

        let record = raw(json!({
            "id": 1,
            "name": "Momo",
            "species": "cat",
            "friends": ["A", 3]
        }));
        assert!(matches!(
            normalize(&record),
            Err(ValidationError::BadRelationList(_))
        ));
    }

    #[test]
    fn test_missing_required_fields() {
        let record = raw(json!({"id": 1, "species": "cat"}));
        assert_eq!(
            normalize(&record),
            Err(ValidationError::MissingField("name".to_string()))
        );

        let record = raw(json!({"name": "Momo", "species": "cat"}));
        assert_eq!(
            normalize(&record),
            Err(ValidationError::MissingField("id".to_string()))
        );

        let record = raw(json!({"id": 1, "name": "Momo"}));
        assert_eq!(
            normalize(&record),
            Err(ValidationError::MissingField("species".to_string()))
        );
    }

    #[test]
    fn test_iso8601_with_zone_marker_and_offset() {
        let record = raw(json!({
            "id": 1,
            "name": "Momo",
            "species": "cat",
            "born_at": "2021-01-01T00:00:00Z"
        }));
        let zulu = normalize(&record).unwrap().born_at.unwrap();

        let record = raw(json!({
            "id": 1,
            "name": "Momo",
            "species": "cat",
            "born_at": "2021-01-01T01:00:00+01:00"
        }));
        let offset = normalize(&record).unwrap().born_at.unwrap();

        assert_eq!(zulu, offset);
        assert_eq!(zulu, Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_naive_iso8601_is_utc() {
        let record = raw(json!({
            "id": 1,
            "name": "Momo",
            "species": "cat",
            "born_at": "2021-06-15T12:30:00"
        }));
        let dt = normalize(&record).unwrap().born_at.unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2021, 6, 15, 12, 30, 0).unwrap());
    }

    #[test]
    fn test_bad_timestamp_shapes() {
        for bad in [json!("not a date"), json!(["2021"]), json!({"epoch": 1})] {
            let record = raw(json!({
                "id": 1,
                "name": "Momo",
                "species": "cat",
                "born_at": bad
            }));
            assert!(
                matches!(normalize(&record), Err(ValidationError::BadTimestamp(_))),
                "expected BadTimestamp"
            );
        }
    }

    #[test]
    fn test_timestamp_round_trip_is_idempotent() {
        let record = raw(json!({
            "id": 1,
            "name": "Momo",
            "species": "cat",
            "born_at": 1609459200123i64
        }));
        let dt = normalize(&record).unwrap().born_at.unwrap();

        let formatted = dt.to_rfc3339();
        let reparsed = parse_iso8601(&formatted).unwrap();
        assert_eq!(dt, reparsed);
    }

    #[test]
    fn test_missing_friends_and_born_at_are_defaults() {
        let record = raw(json!({"id": 1, "name": "Momo", "species": "cat"}));
        let normalized = normalize(&record).unwrap();
        assert!(normalized.friends.is_empty());
        assert!(normalized.born_at.is_none());
        assert!(normalized.age.is_none());
    }
}

//! Domain types for the ETL pipeline
//!
//! Raw records arrive with inconsistent field encodings, so the raw side
//! of the model is a thin wrapper over a JSON object and all typing is
//! deferred to normalization. The canonical record has one fixed type per
//! field and is safe to serialize uniformly once constructed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque record identifier returned by a listing page
///
/// The upstream emits both integer and string identifiers; both are unique
/// within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Str(s) => write!(f, "{}", s),
        }
    }
}

/// One raw upstream record prior to normalization
///
/// Field value types are not guaranteed consistent across records; see
/// [`crate::normalize::normalize`] for the coercion rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

/// One item of a listing page; fields beyond the identifier are ignored
#[derive(Debug, Clone, Deserialize)]
pub struct ListingItem {
    pub id: RecordId,
}

/// Payload of `GET /pages/{n}`
///
/// A page without `items` does not deserialize and is treated as a
/// transient failure by the fetcher.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingPage {
    pub items: Vec<ListingItem>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// Canonical record shape after normalization
///
/// Invariant: every field has passed type coercion. The relation list
/// contains no empty elements and no surrounding whitespace; the timestamp
/// is an instant in UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: RecordId,
    pub name: String,
    pub species: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    pub friends: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub born_at: Option<DateTime<Utc>>,

    /// Pre-normalization relation-list string, retained for the audit
    /// contract of the storage collaborator. Not part of the sink payload.
    #[serde(skip)]
    pub friends_raw: Option<String>,
}

/// Per-batch delivery outcome reported by the Loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PostResult {
    pub succeeded: u64,
    pub failed: u64,
}

/// Sink response body for `POST /batch`
///
/// The sink reports per-item accept/reject counts. A 2xx response with a
/// missing or unparsable body counts the whole batch as accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SinkReceipt {
    #[serde(default)]
    pub accepted: Option<u64>,
    #[serde(default)]
    pub rejected: Option<u64>,
}

/// Terminal result of one pipeline run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { stats: crate::stats::StatsSnapshot },
    Failed {
        stats: crate::stats::StatsSnapshot,
        reason: String,
    },
}

impl RunOutcome {
    pub fn stats(&self) -> &crate::stats::StatsSnapshot {
        match self {
            RunOutcome::Completed { stats } => stats,
            RunOutcome::Failed { stats, .. } => stats,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

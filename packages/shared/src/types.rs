//! Core domain types for the extraction and enrichment pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ZenragError};

// ---------------------------------------------------------------------------
// ItemKind
// ---------------------------------------------------------------------------

/// Whether a workspace item is a plain issue or an epic grouping item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Issue,
    Epic,
}

impl ItemKind {
    pub fn is_epic(self) -> bool {
        matches!(self, Self::Epic)
    }
}

// ---------------------------------------------------------------------------
// RawItem
// ---------------------------------------------------------------------------

/// An opaque workspace item as returned by the source API.
///
/// Immutable once fetched. Relationship fields (`parent_epic`,
/// `dependency_ids`) hold raw identifiers; resolution to titles and
/// pipeline context happens in the relationship resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Source identifier, unique within a workspace.
    pub id: String,
    /// Issue number (display identifier), when the source provides one.
    pub number: Option<u64>,
    pub kind: ItemKind,
    pub title: String,
    pub body: String,
    /// Workflow stage the item currently occupies.
    pub pipeline: Option<String>,
    pub sprint: Option<String>,
    pub estimate: Option<f64>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    /// Raw parent epic identifier, if the item belongs to an epic.
    pub parent_epic: Option<String>,
    /// Raw identifiers of items this item depends on.
    pub dependency_ids: Vec<String>,
    /// Timestamps as received — heterogeneous formats are canonicalized
    /// by the normalizer, not here.
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl RawItem {
    /// Parse one item from a source API payload.
    ///
    /// Fails with [`ZenragError::MalformedResponse`] when the payload is
    /// not an object or lacks an identifier; every other field falls back
    /// to an empty/absent value.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            ZenragError::MalformedResponse("item payload is not an object".into())
        })?;

        let id = obj
            .get("id")
            .and_then(json_id)
            .ok_or_else(|| ZenragError::MalformedResponse("item has no id".into()))?;

        let kind = match obj.get("type").and_then(Value::as_str) {
            Some("epic") => ItemKind::Epic,
            _ => ItemKind::Issue,
        };

        Ok(Self {
            id,
            number: obj.get("number").and_then(Value::as_u64),
            kind,
            title: obj
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            body: obj
                .get("body")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            pipeline: nested_str(obj.get("pipeline"), "name"),
            sprint: nested_str(obj.get("sprint"), "title"),
            estimate: obj
                .get("estimate")
                .and_then(|e| e.get("value"))
                .and_then(Value::as_f64),
            labels: named_list(obj.get("labels"), "name"),
            assignees: named_list(obj.get("assignees"), "login"),
            parent_epic: obj.get("parent_epic").and_then(json_id),
            dependency_ids: obj
                .get("dependencies")
                .and_then(Value::as_array)
                .map(|deps| deps.iter().filter_map(json_id).collect())
                .unwrap_or_default(),
            created_at: obj
                .get("created_at")
                .and_then(json_timestamp),
            updated_at: obj
                .get("updated_at")
                .and_then(json_timestamp),
        })
    }
}

/// Extract `field` from a nested object, tolerating a bare string
/// (e.g. `"pipeline": "Backlog"` next to `"pipeline": {"name": "Backlog"}`).
fn nested_str(value: Option<&Value>, field: &str) -> Option<String> {
    let value = value?;
    value
        .get(field)
        .and_then(Value::as_str)
        .or_else(|| value.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Identifiers may arrive as strings or bare numbers.
fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Timestamps may arrive as strings or epoch numbers; kept verbatim here.
fn json_timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract `field` from each object in a JSON array (e.g. label names).
fn named_list(value: Option<&Value>, field: &str) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|entry| {
                    entry
                        .get(field)
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or_else(|| entry.as_str().map(str::to_string))
                })
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// CanonicalRecord
// ---------------------------------------------------------------------------

/// Fixed metadata schema attached to every output record.
///
/// Every key is always present in serialized form — absent source data maps
/// to `null` or an empty collection, never to an omitted key. This is the
/// JSONL file-format contract and must round-trip losslessly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub issue_number: Option<u64>,
    pub title: String,
    pub pipeline: Option<String>,
    pub epic: Option<String>,
    pub sprint: Option<String>,
    pub estimate: Option<f64>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub dependencies: Vec<String>,
    /// ISO-8601 UTC, canonicalized by the normalizer.
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Set when an enrichment batch exhausted its retries; the record's
    /// content is the original normalizer output in that case.
    #[serde(default)]
    pub enrichment_error: Option<String>,
}

/// The retrieval-ready output unit: a documentation-style `content` string
/// plus fixed-schema metadata.
///
/// Immutable after normalization except for `content`, which the enrichment
/// processor may replace wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub content: String,
    pub metadata: RecordMetadata,
}

// ---------------------------------------------------------------------------
// FilterCriteria
// ---------------------------------------------------------------------------

/// User-specified inclusion criteria, AND-combined. An empty pipeline or
/// label list always passes.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCriteria {
    /// Pipeline-name allow-list.
    pub pipelines: Vec<String>,
    /// Label allow-list — an item passes with at least one matching label.
    pub labels: Vec<String>,
    /// Whether epic items are included in the output.
    pub include_epics: bool,
    /// Whether dependency metadata is carried into records.
    pub include_dependencies: bool,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            pipelines: Vec::new(),
            labels: Vec::new(),
            include_epics: true,
            include_dependencies: true,
        }
    }
}

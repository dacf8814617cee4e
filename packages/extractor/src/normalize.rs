//! Raw item → canonical record normalization.
//!
//! `normalize` is total: every input, including an all-fields-absent item,
//! produces a record with the full fixed metadata schema. Missing text maps
//! to empty strings, missing sets to empty vectors, and missing scalars to
//! `null`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use zenrag_shared::{CanonicalRecord, RawItem, RecordMetadata};

use crate::resolver::RelationshipGraph;

/// Normalize one raw item against the resolved relationship graph.
pub fn normalize(item: &RawItem, graph: &RelationshipGraph) -> CanonicalRecord {
    let epic = graph.epic_for(item);
    let dependencies: Vec<String> = graph.dependencies_of(&item.id).to_vec();

    let metadata = RecordMetadata {
        issue_number: item.number,
        title: item.title.clone(),
        pipeline: item.pipeline.clone(),
        epic: epic.clone(),
        sprint: item.sprint.clone(),
        estimate: item.estimate,
        labels: item.labels.clone(),
        assignees: item.assignees.clone(),
        dependencies: dependencies.clone(),
        created_at: item.created_at.as_deref().and_then(canonical_timestamp),
        updated_at: item.updated_at.as_deref().and_then(canonical_timestamp),
        enrichment_error: None,
    };

    CanonicalRecord {
        content: synthesize_content(item, epic.as_deref(), &dependencies),
        metadata,
    }
}

/// Render the documentation-style content string: title, body, and a summary
/// of the resolved workflow context. The enrichment processor may later
/// replace this text wholesale.
fn synthesize_content(item: &RawItem, epic: Option<&str>, dependencies: &[String]) -> String {
    let mut content = String::new();

    let heading = match (item.kind.is_epic(), item.number) {
        (true, _) => format!("Epic: {}", item.title),
        (false, Some(n)) => format!("Issue #{n}: {}", item.title),
        (false, None) => format!("Issue: {}", item.title),
    };
    content.push_str(&heading);

    if !item.body.is_empty() {
        content.push_str("\n\n");
        content.push_str(&item.body);
    }

    let mut context_lines: Vec<String> = Vec::new();
    if let Some(pipeline) = &item.pipeline {
        context_lines.push(format!("Pipeline: {pipeline}"));
    }
    if let Some(epic) = epic {
        context_lines.push(format!("Epic: {epic}"));
    }
    if let Some(sprint) = &item.sprint {
        context_lines.push(format!("Sprint: {sprint}"));
    }
    if let Some(estimate) = item.estimate {
        context_lines.push(format!("Estimate: {estimate}"));
    }
    if !item.labels.is_empty() {
        context_lines.push(format!("Labels: {}", item.labels.join(", ")));
    }
    if !item.assignees.is_empty() {
        context_lines.push(format!("Assignees: {}", item.assignees.join(", ")));
    }
    if !dependencies.is_empty() {
        context_lines.push(format!("Depends on: {}", dependencies.join(", ")));
    }

    if !context_lines.is_empty() {
        content.push_str("\n\n");
        content.push_str(&context_lines.join("\n"));
    }

    content
}

/// Canonicalize a source timestamp to RFC 3339 UTC ("...Z").
///
/// Accepts RFC 3339 with any offset, epoch seconds, and the common
/// `YYYY-MM-DD[ HH:MM:SS]` shapes. Unrecognized input maps to `None`.
pub fn canonical_timestamp(raw: &str) -> Option<String> {
    let utc: DateTime<Utc> = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.with_timezone(&Utc)
    } else if let Ok(secs) = raw.parse::<i64>() {
        DateTime::from_timestamp(secs, 0)?
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        naive.and_utc()
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)?.and_utc()
    } else {
        return None;
    };

    Some(utc.to_rfc3339_opts(SecondsFormat::Secs, true))
}

//! Content analysis over canonical records, shared by `inspect` and `stats`.

use std::collections::BTreeMap;

use serde::Serialize;

use zenrag_shared::CanonicalRecord;

/// Aggregated statistics over a record set.
#[derive(Debug, Serialize)]
pub(crate) struct Analysis {
    pub total_documents: usize,
    /// Record count per pipeline name. Records without a pipeline fall under
    /// `(none)`.
    pub pipelines: BTreeMap<String, usize>,
    pub epics: BTreeMap<String, usize>,
    pub labels: BTreeMap<String, usize>,
    pub sprints: BTreeMap<String, usize>,
    pub estimated: usize,
    pub total_estimate: f64,
    pub with_dependencies: usize,
    pub total_dependencies: usize,
    pub assigned: usize,
    pub unassigned: usize,
    pub enrichment_failures: usize,
    pub total_content_chars: usize,
    pub avg_content_chars: usize,
}

/// Compute an [`Analysis`] over the given records.
pub(crate) fn analyze(records: &[CanonicalRecord]) -> Analysis {
    let mut pipelines: BTreeMap<String, usize> = BTreeMap::new();
    let mut epics: BTreeMap<String, usize> = BTreeMap::new();
    let mut labels: BTreeMap<String, usize> = BTreeMap::new();
    let mut sprints: BTreeMap<String, usize> = BTreeMap::new();
    let mut estimated = 0;
    let mut total_estimate = 0.0;
    let mut with_dependencies = 0;
    let mut total_dependencies = 0;
    let mut assigned = 0;
    let mut enrichment_failures = 0;
    let mut total_content_chars = 0;

    for record in records {
        let meta = &record.metadata;

        let pipeline = meta.pipeline.clone().unwrap_or_else(|| "(none)".into());
        *pipelines.entry(pipeline).or_default() += 1;

        if let Some(epic) = &meta.epic {
            *epics.entry(epic.clone()).or_default() += 1;
        }
        for label in &meta.labels {
            *labels.entry(label.clone()).or_default() += 1;
        }
        if let Some(sprint) = &meta.sprint {
            *sprints.entry(sprint.clone()).or_default() += 1;
        }
        if let Some(estimate) = meta.estimate {
            estimated += 1;
            total_estimate += estimate;
        }
        if !meta.dependencies.is_empty() {
            with_dependencies += 1;
            total_dependencies += meta.dependencies.len();
        }
        if !meta.assignees.is_empty() {
            assigned += 1;
        }
        if meta.enrichment_error.is_some() {
            enrichment_failures += 1;
        }
        total_content_chars += record.content.chars().count();
    }

    let total_documents = records.len();
    Analysis {
        total_documents,
        pipelines,
        epics,
        labels,
        sprints,
        estimated,
        total_estimate,
        with_dependencies,
        total_dependencies,
        assigned,
        unassigned: total_documents - assigned,
        enrichment_failures,
        total_content_chars,
        avg_content_chars: if total_documents > 0 {
            total_content_chars / total_documents
        } else {
            0
        },
    }
}

/// Render an [`Analysis`] to stdout.
pub(crate) fn print_analysis(analysis: &Analysis) {
    println!();
    println!("  Workspace analysis");
    println!("  Documents:        {}", analysis.total_documents);
    println!(
        "  Estimated:        {} (total {} points)",
        analysis.estimated, analysis.total_estimate
    );
    println!(
        "  Dependencies:     {} records, {} links",
        analysis.with_dependencies, analysis.total_dependencies
    );
    println!(
        "  Assignment:       {} assigned, {} unassigned",
        analysis.assigned, analysis.unassigned
    );
    if analysis.enrichment_failures > 0 {
        println!("  Enrich failures:  {}", analysis.enrichment_failures);
    }
    println!(
        "  Content:          {} chars total, {} avg",
        analysis.total_content_chars, analysis.avg_content_chars
    );

    print_section("Pipelines", &analysis.pipelines);
    print_section("Epics", &analysis.epics);
    print_section("Labels", &analysis.labels);
    print_section("Sprints", &analysis.sprints);
    println!();
}

fn print_section(title: &str, counts: &BTreeMap<String, usize>) {
    if counts.is_empty() {
        return;
    }
    println!();
    println!("  {title}:");
    for (name, count) in counts {
        println!("    {name}: {count}");
    }
}

//! Inclusion/exclusion predicates applied before normalization.

use zenrag_shared::{FilterCriteria, RawItem};

/// Whether `item` passes the user's criteria.
///
/// Pure and stateless: criteria are AND-combined, labels use OR semantics
/// within the list, and an empty criterion always passes. Evaluation order
/// never affects the result.
pub fn matches(item: &RawItem, criteria: &FilterCriteria) -> bool {
    if item.kind.is_epic() && !criteria.include_epics {
        return false;
    }

    if !criteria.pipelines.is_empty() {
        match &item.pipeline {
            Some(pipeline) if criteria.pipelines.iter().any(|p| p == pipeline) => {}
            _ => return false,
        }
    }

    if !criteria.labels.is_empty()
        && !item.labels.iter().any(|l| criteria.labels.contains(l))
    {
        return false;
    }

    true
}

//! Cross-entity relationship resolution.
//!
//! Builds flat lookup maps from the full set of fetched items: epic titles,
//! pipeline/sprint descriptors, and direct dependency identifier sets.
//! Only direct references are stored — no transitive closure — so cyclic or
//! self-referential dependency pointers are safe by construction and the
//! graph stays O(items).

use std::collections::{BTreeSet, HashMap};

use zenrag_shared::RawItem;

/// Pipeline/sprint descriptor for one item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageInfo {
    pub pipeline: Option<String>,
    pub sprint: Option<String>,
}

/// Read-only relationship lookup built once per extraction run.
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    /// Identifier → epic title, for items tagged as epics.
    epic_titles: HashMap<String, String>,
    /// Identifier → pipeline/sprint descriptor.
    stages: HashMap<String, StageInfo>,
    /// Identifier → direct dependency target identifiers.
    dependencies: HashMap<String, Vec<String>>,
    /// Referenced identifiers (epic parents or dependency targets) that did
    /// not resolve to any fetched item. Recorded, never silently dropped.
    unresolved: BTreeSet<String>,
}

impl RelationshipGraph {
    /// Resolved epic metadata for `item`: the parent epic's title when the
    /// parent was fetched, else the literal parent identifier, else `None`.
    pub fn epic_for(&self, item: &RawItem) -> Option<String> {
        let parent = item.parent_epic.as_ref()?;
        Some(
            self.epic_titles
                .get(parent)
                .cloned()
                .unwrap_or_else(|| parent.clone()),
        )
    }

    /// Direct dependency target identifiers for `id`, in source order.
    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.dependencies.get(id).map_or(&[], Vec::as_slice)
    }

    /// Pipeline/sprint descriptor for `id`.
    pub fn stage_of(&self, id: &str) -> Option<&StageInfo> {
        self.stages.get(id)
    }

    /// Referenced identifiers that resolved to no fetched item.
    pub fn unresolved(&self) -> &BTreeSet<String> {
        &self.unresolved
    }
}

/// Build the relationship graph from the full fetched item set.
pub fn resolve(items: &[RawItem]) -> RelationshipGraph {
    let mut graph = RelationshipGraph::default();
    let mut known: BTreeSet<&str> = BTreeSet::new();

    for item in items {
        known.insert(item.id.as_str());

        if item.kind.is_epic() {
            graph.epic_titles.insert(item.id.clone(), item.title.clone());
        }

        graph.stages.insert(
            item.id.clone(),
            StageInfo {
                pipeline: item.pipeline.clone(),
                sprint: item.sprint.clone(),
            },
        );

        if !item.dependency_ids.is_empty() {
            graph
                .dependencies
                .insert(item.id.clone(), item.dependency_ids.clone());
        }
    }

    // Record dangling references. Epic parents that exist but are not epics
    // still resolve (to the literal id), so only truly unknown ids land here.
    for item in items {
        if let Some(parent) = &item.parent_epic {
            if !known.contains(parent.as_str()) {
                graph.unresolved.insert(parent.clone());
            }
        }
        for dep in &item.dependency_ids {
            if !known.contains(dep.as_str()) {
                graph.unresolved.insert(dep.clone());
            }
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use zenrag_shared::ItemKind;

    fn item(id: &str, kind: ItemKind, parent: Option<&str>, deps: &[&str]) -> RawItem {
        RawItem {
            id: id.into(),
            number: None,
            kind,
            title: format!("title-{id}"),
            body: String::new(),
            pipeline: Some("In Progress".into()),
            sprint: Some("Sprint 9".into()),
            estimate: None,
            labels: Vec::new(),
            assignees: Vec::new(),
            parent_epic: parent.map(String::from),
            dependency_ids: deps.iter().map(|d| d.to_string()).collect(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn epic_resolves_to_title() {
        let items = vec![
            item("E-1", ItemKind::Epic, None, &[]),
            item("I-1", ItemKind::Issue, Some("E-1"), &[]),
        ];
        let graph = resolve(&items);
        assert_eq!(graph.epic_for(&items[1]).as_deref(), Some("title-E-1"));
        assert!(graph.unresolved().is_empty());
    }

    #[test]
    fn unknown_epic_falls_back_to_literal_id() {
        let items = vec![item("I-1", ItemKind::Issue, Some("E-99"), &[])];
        let graph = resolve(&items);
        assert_eq!(graph.epic_for(&items[0]).as_deref(), Some("E-99"));
        assert!(graph.unresolved().contains("E-99"));
    }

    #[test]
    fn no_parent_means_no_epic() {
        let items = vec![item("I-1", ItemKind::Issue, None, &[])];
        let graph = resolve(&items);
        assert_eq!(graph.epic_for(&items[0]), None);
    }

    #[test]
    fn dependencies_are_direct_only() {
        // I-1 → I-2 → I-3: no closure, I-1 sees only I-2.
        let items = vec![
            item("I-1", ItemKind::Issue, None, &["I-2"]),
            item("I-2", ItemKind::Issue, None, &["I-3"]),
            item("I-3", ItemKind::Issue, None, &[]),
        ];
        let graph = resolve(&items);
        assert_eq!(graph.dependencies_of("I-1"), ["I-2"]);
        assert_eq!(graph.dependencies_of("I-2"), ["I-3"]);
        assert!(graph.dependencies_of("I-3").is_empty());
    }

    #[test]
    fn dependency_cycles_are_safe() {
        let items = vec![
            item("A", ItemKind::Issue, None, &["B"]),
            item("B", ItemKind::Issue, None, &["A"]),
            item("C", ItemKind::Issue, None, &["C"]),
        ];
        let graph = resolve(&items);
        assert_eq!(graph.dependencies_of("A"), ["B"]);
        assert_eq!(graph.dependencies_of("B"), ["A"]);
        assert_eq!(graph.dependencies_of("C"), ["C"]);
        assert!(graph.unresolved().is_empty());
    }

    #[test]
    fn dangling_dependency_is_recorded() {
        let items = vec![item("A", ItemKind::Issue, None, &["GONE"])];
        let graph = resolve(&items);
        assert_eq!(graph.dependencies_of("A"), ["GONE"]);
        assert!(graph.unresolved().contains("GONE"));
    }

    #[test]
    fn stage_lookup() {
        let items = vec![item("A", ItemKind::Issue, None, &[])];
        let graph = resolve(&items);
        let stage = graph.stage_of("A").expect("stage");
        assert_eq!(stage.pipeline.as_deref(), Some("In Progress"));
        assert_eq!(stage.sprint.as_deref(), Some("Sprint 9"));
        assert!(graph.stage_of("missing").is_none());
    }
}

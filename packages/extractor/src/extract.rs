//! Workspace extraction: cursor pagination, early filtering, relationship
//! resolution.
//!
//! The extractor walks a workspace's issue and epic pages through the API
//! client, applies user filters per item as pages arrive, and keeps excluded
//! items in a separate context set so relationships from included items can
//! still resolve against them. A page failure after retry exhaustion aborts
//! the whole run — partial results are never silently returned.

use serde_json::Value;
use tracing::{info, instrument, warn};

use zenrag_client::ApiClient;
use zenrag_shared::{FilterCriteria, RawItem, Result, ZenragError};

use crate::filter;
use crate::resolver::{self, RelationshipGraph};

// ---------------------------------------------------------------------------
// FetchPage
// ---------------------------------------------------------------------------

/// One paginated response segment. Transient: consumed as soon as its items
/// are absorbed into the item sequence.
#[derive(Debug)]
pub struct FetchPage {
    pub items: Vec<RawItem>,
    pub next_cursor: Option<String>,
}

impl FetchPage {
    /// Parse a page payload. A missing `items` array is malformed and fails
    /// the page; an individual malformed item is logged and skipped.
    pub fn from_json(payload: &Value) -> Result<Self> {
        let raw_items = payload
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ZenragError::MalformedResponse("page payload has no items array".into())
            })?;

        let mut items = Vec::with_capacity(raw_items.len());
        for raw in raw_items {
            match RawItem::from_json(raw) {
                Ok(item) => items.push(item),
                Err(error) => {
                    warn!(%error, "skipping malformed item in page");
                }
            }
        }

        let next_cursor = payload
            .get("next_cursor")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(String::from);

        Ok(Self { items, next_cursor })
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for extraction; a pure sink with no feedback into the
/// pipeline.
pub trait ExtractProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each page with the running item total.
    fn items_fetched(&self, count: usize);
}

/// No-op progress for headless/test usage.
pub struct SilentExtract;

impl ExtractProgress for SilentExtract {
    fn phase(&self, _name: &str) {}
    fn items_fetched(&self, _count: usize) {}
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Output of one extraction run.
///
/// `included` preserves page-traversal order — the output record order
/// downstream. `context` holds items the filters excluded; they are never
/// emitted but stay available so included items' epic and dependency
/// references resolve.
#[derive(Debug)]
pub struct Extraction {
    pub included: Vec<RawItem>,
    pub context: Vec<RawItem>,
    pub graph: RelationshipGraph,
    pub fetched: usize,
    pub filtered_out: usize,
}

/// Paginating extractor over one workspace.
pub struct WorkspaceExtractor<'a> {
    client: &'a ApiClient,
    per_page: u32,
}

impl<'a> WorkspaceExtractor<'a> {
    pub fn new(client: &'a ApiClient, per_page: u32) -> Self {
        Self { client, per_page }
    }

    /// Extract a workspace's items and build the relationship graph.
    #[instrument(skip_all, fields(workspace_id = %workspace_id))]
    pub async fn extract(
        &self,
        workspace_id: &str,
        criteria: &FilterCriteria,
        progress: &dyn ExtractProgress,
    ) -> Result<Extraction> {
        let mut included: Vec<RawItem> = Vec::new();
        let mut context: Vec<RawItem> = Vec::new();
        let mut fetched = 0usize;

        progress.phase("Fetching issues");
        self.fetch_all(
            &format!("workspaces/{workspace_id}/issues"),
            criteria,
            &mut included,
            &mut context,
            &mut fetched,
            progress,
        )
        .await?;

        progress.phase("Fetching epics");
        self.fetch_all(
            &format!("workspaces/{workspace_id}/epics"),
            criteria,
            &mut included,
            &mut context,
            &mut fetched,
            progress,
        )
        .await?;

        // The graph covers everything fetched, so included items can resolve
        // references that point at excluded items.
        let all: Vec<RawItem> = included.iter().chain(context.iter()).cloned().collect();
        let graph = resolver::resolve(&all);

        if !graph.unresolved().is_empty() {
            warn!(
                count = graph.unresolved().len(),
                "references to items outside the workspace remain unresolved"
            );
        }

        info!(
            fetched,
            included = included.len(),
            filtered_out = context.len(),
            "extraction complete"
        );

        Ok(Extraction {
            filtered_out: context.len(),
            included,
            context,
            graph,
            fetched,
        })
    }

    /// Walk every page of `path`, splitting items into included/context.
    async fn fetch_all(
        &self,
        path: &str,
        criteria: &FilterCriteria,
        included: &mut Vec<RawItem>,
        context: &mut Vec<RawItem>,
        fetched: &mut usize,
        progress: &dyn ExtractProgress,
    ) -> Result<()> {
        let mut cursor: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> =
                vec![("per_page", self.per_page.to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let payload = self
                .client
                .get(path, &query)
                .await
                .map_err(|e| ZenragError::extraction(*fetched, e))?;
            let page =
                FetchPage::from_json(&payload).map_err(|e| ZenragError::extraction(*fetched, e))?;

            *fetched += page.items.len();
            progress.items_fetched(*fetched);

            for item in page.items {
                let item = apply_toggles(item, criteria);
                if filter::matches(&item, criteria) {
                    included.push(item);
                } else {
                    context.push(item);
                }
            }

            match page.next_cursor {
                // A cursor that never advances would loop forever; treat it
                // as a malformed page.
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(ZenragError::extraction(
                        *fetched,
                        ZenragError::MalformedResponse(format!(
                            "pagination cursor '{next}' did not advance"
                        )),
                    ));
                }
                Some(next) => cursor = Some(next),
                None => return Ok(()),
            }
        }
    }
}

/// Project away relationship data the user toggled off, before resolution.
/// With epics excluded the parent pointer is dropped (no epic metadata); with
/// dependencies excluded the dependency pointers are dropped.
fn apply_toggles(mut item: RawItem, criteria: &FilterCriteria) -> RawItem {
    if !criteria.include_epics {
        item.parent_epic = None;
    }
    if !criteria.include_dependencies {
        item.dependency_ids.clear();
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;
    use wiremock::matchers::{method, path as url_path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zenrag_shared::config::ClientConfig;

    fn client(server: &MockServer) -> ApiClient {
        let config = ClientConfig {
            max_retries: 1,
            base_delay_ms: 1,
            max_delay_ms: 10,
            timeout_secs: 5,
        };
        ApiClient::new(&server.uri(), "token", &config).unwrap()
    }

    fn issue(id: &str, number: u64, pipeline: &str) -> Value {
        json!({
            "id": id,
            "number": number,
            "type": "issue",
            "title": format!("Issue {number}"),
            "body": "details",
            "pipeline": {"name": pipeline},
        })
    }

    async fn mount_empty_epics(server: &MockServer, workspace: &str) {
        Mock::given(method("GET"))
            .and(url_path(format!("/workspaces/{workspace}/epics")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [],
                "next_cursor": null,
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn page_parse_requires_items_array() {
        let err = FetchPage::from_json(&json!({"nope": true})).unwrap_err();
        assert!(matches!(err, ZenragError::MalformedResponse(_)));
    }

    #[test]
    fn page_parse_skips_malformed_items() {
        let page = FetchPage::from_json(&json!({
            "items": [issue("I-1", 1, "Backlog"), {"title": "no id"}, issue("I-2", 2, "Backlog")],
            "next_cursor": "abc",
        }))
        .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn paginates_until_cursor_is_exhausted() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(url_path("/workspaces/ws1/issues"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [issue("I-3", 3, "Backlog")],
                "next_cursor": null,
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/workspaces/ws1/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [issue("I-1", 1, "Backlog"), issue("I-2", 2, "Backlog")],
                "next_cursor": "page2",
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_empty_epics(&server, "ws1").await;

        let client = client(&server);
        let extractor = WorkspaceExtractor::new(&client, 100);
        let extraction = extractor
            .extract("ws1", &FilterCriteria::default(), &SilentExtract)
            .await
            .unwrap();

        assert_eq!(extraction.fetched, 3);
        // Page-traversal order is preserved.
        let ids: Vec<&str> = extraction.included.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["I-1", "I-2", "I-3"]);
    }

    #[tokio::test]
    async fn page_failure_aborts_with_progress_count() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(url_path("/workspaces/ws1/issues"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/workspaces/ws1/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [issue("I-1", 1, "Backlog"), issue("I-2", 2, "Backlog")],
                "next_cursor": "page2",
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let extractor = WorkspaceExtractor::new(&client, 100);
        let err = extractor
            .extract("ws1", &FilterCriteria::default(), &SilentExtract)
            .await
            .unwrap_err();

        match err {
            ZenragError::Extraction {
                items_fetched,
                source,
            } => {
                assert_eq!(items_fetched, 2);
                assert!(matches!(*source, ZenragError::Network(_)));
            }
            other => panic!("expected extraction error, got {other}"),
        }
    }

    #[tokio::test]
    async fn repeated_cursor_aborts_pagination() {
        let server = MockServer::start().await;

        // Every page claims "loop" is the next cursor.
        Mock::given(method("GET"))
            .and(url_path("/workspaces/ws1/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [issue("I-1", 1, "Backlog")],
                "next_cursor": "loop",
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let extractor = WorkspaceExtractor::new(&client, 100);
        let err = extractor
            .extract("ws1", &FilterCriteria::default(), &SilentExtract)
            .await
            .unwrap_err();

        match err {
            ZenragError::Extraction {
                items_fetched,
                source,
            } => {
                assert_eq!(items_fetched, 2);
                assert!(matches!(*source, ZenragError::MalformedResponse(_)));
            }
            other => panic!("expected extraction error, got {other}"),
        }
    }

    // Workspace with 3 issues, one epic, one cross-dependency, filtered to
    // "In Progress": one record comes out, with resolved epic title and
    // dependency id.
    #[tokio::test]
    async fn filtered_workspace_resolves_context_from_excluded_items() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(url_path("/workspaces/ws1/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": "I-1", "number": 1, "type": "issue",
                        "title": "Active work", "body": "in flight",
                        "pipeline": {"name": "In Progress"},
                        "parent_epic": "E-1",
                        "dependencies": ["I-2"],
                    },
                    issue("I-2", 2, "Backlog"),
                    issue("I-3", 3, "Done"),
                ],
                "next_cursor": null,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/workspaces/ws1/epics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "E-1", "type": "epic", "title": "Big rollout"},
                ],
                "next_cursor": null,
            })))
            .mount(&server)
            .await;

        let criteria = FilterCriteria {
            pipelines: vec!["In Progress".into()],
            ..Default::default()
        };

        let client = client(&server);
        let extractor = WorkspaceExtractor::new(&client, 100);
        let extraction = extractor
            .extract("ws1", &criteria, &SilentExtract)
            .await
            .unwrap();

        assert_eq!(extraction.fetched, 4);
        assert_eq!(extraction.included.len(), 1);
        assert_eq!(extraction.filtered_out, 3);

        let record = normalize(&extraction.included[0], &extraction.graph);
        assert_eq!(record.metadata.epic.as_deref(), Some("Big rollout"));
        assert_eq!(record.metadata.dependencies, vec!["I-2"]);
    }

    #[tokio::test]
    async fn dependency_toggle_strips_dependency_metadata() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(url_path("/workspaces/ws1/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": "I-1", "number": 1, "type": "issue",
                        "title": "Solo", "dependencies": ["I-2"],
                    },
                ],
                "next_cursor": null,
            })))
            .mount(&server)
            .await;
        mount_empty_epics(&server, "ws1").await;

        let criteria = FilterCriteria {
            include_dependencies: false,
            ..Default::default()
        };

        let client = client(&server);
        let extractor = WorkspaceExtractor::new(&client, 100);
        let extraction = extractor
            .extract("ws1", &criteria, &SilentExtract)
            .await
            .unwrap();

        let record = normalize(&extraction.included[0], &extraction.graph);
        assert!(record.metadata.dependencies.is_empty());
    }
}

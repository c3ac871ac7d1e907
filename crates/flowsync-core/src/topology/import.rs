//! Materializing an export document into a project
//!
//! Best effort: every element that can be written is written, failures are
//! collected into the report. Nothing is rolled back.
//!
//! Order of work:
//! 1. version check, then the project description when the document has one
//! 2. graphs (reused by resource name, then by display name, else created)
//! 3. nodes (updated in place when the id or its synthesized name exists)
//! 4. readiness wait for created nodes
//! 5. edges and edge-level configurations, one merged update per node
//! 6. dashboard pages with a title not yet present
//!
//! Synthesized names that collide within one document get a numeric suffix
//! in document order, so a repeated import resolves to the same nodes.

use crate::config::SyncConfig;
use crate::error::ImportError;
use crate::topology::naming;
use flowsync_gateway::{NodeFilter, ObjectStore, StoreError};
use flowsync_model::{
    Edge, ExportDocument, ExportEdge, ExportNode, Node, Page, PortConfig, PortRef,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One element that could not be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementFailure {
    pub id: String,
    pub reason: String,
}

impl ElementFailure {
    fn new(id: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Old graph resource name to the created graph
    pub graphs_created: BTreeMap<String, String>,
    /// Old node id to the created node
    pub nodes_created: BTreeMap<String, String>,
    /// Existing nodes updated in place
    pub nodes_updated: Vec<String>,
    pub edges_written: usize,
    pub edges_skipped: usize,
    pub pages_created: Vec<String>,
    /// Titles already present in the project
    pub pages_skipped: Vec<String>,
    pub failed_graphs: Vec<ElementFailure>,
    pub failed_nodes: Vec<ElementFailure>,
    pub failed_pages: Vec<ElementFailure>,
    /// Nodes whose merged edge update failed
    pub failed_updates: Vec<ElementFailure>,
    /// Reason the project description could not be saved; does not fail
    /// the import
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_error: Option<String>,
}

impl ImportReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed_graphs.is_empty()
            && self.failed_nodes.is_empty()
            && self.failed_pages.is_empty()
            && self.failed_updates.is_empty()
    }

    /// One line naming every failed element
    #[must_use]
    pub fn failure_summary(&self) -> String {
        [
            ("graph", &self.failed_graphs),
            ("node", &self.failed_nodes),
            ("page", &self.failed_pages),
            ("edge update", &self.failed_updates),
        ]
        .into_iter()
        .filter(|(_, failures)| !failures.is_empty())
        .map(|(kind, failures)| {
            let ids: Vec<String> = failures
                .iter()
                .map(|f| format!("{} ({})", f.id, f.reason))
                .collect();
            format!("{} {kind}(s): {}", failures.len(), ids.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
    }
}

/// Edge writes collected for one node
#[derive(Debug, Default)]
struct PendingWrite {
    edges: Vec<Edge>,
    configs: Vec<PortConfig>,
}

impl PendingWrite {
    fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.configs.is_empty()
    }
}

/// Imports documents into one store
pub struct Importer<'a> {
    store: &'a dyn ObjectStore,
    config: &'a SyncConfig,
}

impl std::fmt::Debug for Importer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> Importer<'a> {
    #[must_use]
    pub fn new(store: &'a dyn ObjectStore, config: &'a SyncConfig) -> Self {
        Self { store, config }
    }

    /// Decodes and imports a serialized document
    pub async fn import_json(&self, project: &str, raw: &str) -> Result<ImportReport, ImportError> {
        let document = ExportDocument::from_json(raw)?;
        self.import(project, &document).await
    }

    /// Imports `document` into `project`
    ///
    /// Returns `ImportError::Partial` when any element failed; the report
    /// then still lists everything that was committed.
    pub async fn import(&self, project: &str, document: &ExportDocument) -> Result<ImportReport, ImportError> {
        if project.is_empty() {
            return Err(ImportError::InvalidInput("project is required".into()));
        }
        document.check_version()?;
        let mut report = ImportReport::default();

        if !document.description.is_empty() {
            if let Err(err) = self
                .store
                .update_project_description(project, &document.description)
                .await
            {
                tracing::error!(project, error = %err, "failed to save project description");
                report.description_error = Some(err.to_string());
            }
        }

        let graph_map = self.import_graphs(project, document, &mut report).await?;

        let existing: HashSet<String> = self
            .store
            .list_nodes(&NodeFilter::project(project))
            .await?
            .into_iter()
            .map(|n| n.name)
            .collect();

        let mut node_map: HashMap<String, String> = HashMap::new();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut created = Vec::new();
        for element in document.nodes() {
            let Some(graph) = graph_map.get(&element.owning_graph) else {
                report
                    .failed_nodes
                    .push(ElementFailure::new(&element.id, format!("unknown graph '{}'", element.owning_graph)));
                continue;
            };
            let name = import_name(project, graph, element, &existing, &claimed);
            claimed.insert(name.clone());
            match self.import_node(project, graph, element, name, &existing).await {
                Ok((name, true)) => {
                    report.nodes_created.insert(element.id.clone(), name.clone());
                    node_map.insert(element.id.clone(), name.clone());
                    created.push(name);
                }
                Ok((name, false)) => {
                    report.nodes_updated.push(name.clone());
                    node_map.insert(element.id.clone(), name);
                }
                Err(err) => {
                    tracing::error!(node = %element.id, error = %err, "node import failed");
                    report.failed_nodes.push(ElementFailure::new(&element.id, err));
                }
            }
        }

        self.wait_ready(&created).await;

        let pending = self.plan_edges(document, &node_map, &graph_map, &mut report);
        for (name, write) in pending {
            let edges = write.edges.len();
            match self.apply_write(&name, write).await {
                Ok(()) => report.edges_written += edges,
                Err(err) => {
                    tracing::error!(node = %name, error = %err, "edge update failed");
                    report.failed_updates.push(ElementFailure::new(name, err));
                }
            }
        }

        self.import_pages(project, document, &node_map, &mut report).await?;

        tracing::info!(
            project,
            graphs = report.graphs_created.len(),
            created = report.nodes_created.len(),
            updated = report.nodes_updated.len(),
            edges = report.edges_written,
            skipped_edges = report.edges_skipped,
            pages = report.pages_created.len(),
            "import finished"
        );
        if report.is_success() {
            Ok(report)
        } else {
            Err(ImportError::Partial { report })
        }
    }

    /// Maps every declared resource name to the graph used for it
    async fn import_graphs(
        &self,
        project: &str,
        document: &ExportDocument,
        report: &mut ImportReport,
    ) -> Result<HashMap<String, String>, ImportError> {
        let existing = self.store.list_graphs(project).await?;
        let mut mapping = HashMap::new();
        for declared in &document.graphs {
            let reused = existing
                .iter()
                .find(|g| g.name == declared.resource_name)
                .or_else(|| existing.iter().find(|g| g.display_name == declared.name));
            if let Some(graph) = reused {
                tracing::debug!(graph = %graph.name, "reusing existing graph");
                mapping.insert(declared.resource_name.clone(), graph.name.clone());
                continue;
            }
            match self.store.create_graph(project, &declared.name).await {
                Ok(graph) => {
                    tracing::info!(from = %declared.resource_name, to = %graph.name, "created graph");
                    report
                        .graphs_created
                        .insert(declared.resource_name.clone(), graph.name.clone());
                    mapping.insert(declared.resource_name.clone(), graph.name);
                }
                Err(err) => {
                    tracing::error!(graph = %declared.name, error = %err, "graph import failed");
                    report
                        .failed_graphs
                        .push(ElementFailure::new(&declared.resource_name, err));
                }
            }
        }
        // Graphs referenced by elements but not declared keep their name if present
        for graph in &existing {
            mapping.entry(graph.name.clone()).or_insert_with(|| graph.name.clone());
        }
        Ok(mapping)
    }

    /// Writes `element` as `name`; returns the name and whether the node
    /// was created
    async fn import_node(
        &self,
        project: &str,
        graph: &str,
        element: &ExportNode,
        name: String,
        existing: &HashSet<String>,
    ) -> Result<(String, bool), StoreError> {
        if existing.contains(&name) {
            let mut node = self.store.get_node(&name).await?;
            apply_element(&mut node, graph, element);
            self.store
                .update_node_sync(node, self.config.write_timeout())
                .await?;
            tracing::debug!(node = %name, "updated existing node");
            Ok((name, false))
        } else {
            let mut node = Node::new(name.as_str(), project, graph, element.component.clone());
            apply_element(&mut node, graph, element);
            self.store.create_node(node).await?;
            tracing::info!(from = %element.id, to = %name, "created node");
            Ok((name, true))
        }
    }

    /// Polls created nodes until queryable or the readiness deadline passes
    async fn wait_ready(&self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        let poll = self.config.readiness_poll_interval();
        let mut pending: Vec<&String> = names.iter().collect();
        let waited = tokio::time::timeout(self.config.readiness_timeout(), async {
            while !pending.is_empty() {
                let mut still = Vec::new();
                for name in pending {
                    if self.store.get_node(name).await.is_err() {
                        still.push(name);
                    }
                }
                pending = still;
                if !pending.is_empty() {
                    tokio::time::sleep(poll).await;
                }
            }
        })
        .await;
        if waited.is_err() {
            tracing::warn!(
                timeout = ?self.config.readiness_timeout(),
                "some imported nodes are not queryable yet"
            );
        }
    }

    /// Groups edge writes by the node that has to be updated
    fn plan_edges(
        &self,
        document: &ExportDocument,
        node_map: &HashMap<String, String>,
        graph_map: &HashMap<String, String>,
        report: &mut ImportReport,
    ) -> BTreeMap<String, PendingWrite> {
        let mut pending: BTreeMap<String, PendingWrite> = BTreeMap::new();
        for element in document.edges() {
            let (Some(source), Some(target)) = (node_map.get(&element.source), node_map.get(&element.target))
            else {
                tracing::debug!(edge = %element.id, "skipping edge with unresolved endpoint");
                report.edges_skipped += 1;
                continue;
            };
            let graph = graph_map
                .get(&element.owning_graph)
                .cloned()
                .unwrap_or_else(|| element.owning_graph.clone());
            let (edge, config) = edge_writes(element, source, target, &graph);
            pending.entry(source.clone()).or_default().edges.push(edge);
            if let Some(config) = config {
                pending.entry(target.clone()).or_default().configs.push(config);
            }
        }
        pending.retain(|_, w| !w.is_empty());
        pending
    }

    async fn apply_write(&self, name: &str, write: PendingWrite) -> Result<(), StoreError> {
        let mut node = self.store.get_node(name).await?;
        for edge in write.edges {
            node.upsert_edge(edge);
        }
        for config in write.configs {
            node.upsert_port_config(config);
        }
        self.store
            .update_node_sync(node, self.config.write_timeout())
            .await?;
        Ok(())
    }

    async fn import_pages(
        &self,
        project: &str,
        document: &ExportDocument,
        node_map: &HashMap<String, String>,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        if document.pages.is_empty() {
            return Ok(());
        }
        let titles: HashSet<String> = self
            .store
            .list_pages(project)
            .await?
            .into_iter()
            .map(|p| p.title)
            .collect();

        for exported in &document.pages {
            if titles.contains(&exported.title) {
                tracing::debug!(title = %exported.title, "page title exists, skipping");
                report.pages_skipped.push(exported.title.clone());
                continue;
            }
            let widgets = exported
                .widgets
                .iter()
                .filter_map(|w| {
                    let node = node_map.get(&w.port.node)?;
                    let mut placed = w.clone();
                    placed.port = w.port.with_node(node.as_str());
                    Some(placed)
                })
                .collect::<Vec<_>>();

            let page = Page::new("", project, exported.title.as_str()).with_sort_index(exported.sort_index);
            let result = async {
                let mut stored = self.store.create_page(page).await?;
                if !widgets.is_empty() {
                    stored.widgets = widgets;
                    stored = self.store.update_page(stored).await?;
                }
                Ok::<_, StoreError>(stored)
            }
            .await;
            match result {
                Ok(stored) => {
                    tracing::info!(page = %stored.name, title = %stored.title, "created page");
                    report.pages_created.push(stored.name);
                }
                Err(err) => {
                    tracing::error!(title = %exported.title, error = %err, "page import failed");
                    report.failed_pages.push(ElementFailure::new(&exported.title, err));
                }
            }
        }
        Ok(())
    }
}

/// Stored name for `element`: its own id when that node exists, otherwise
/// the synthesized name, numbered past names already used by this import
fn import_name(
    project: &str,
    graph: &str,
    element: &ExportNode,
    existing: &HashSet<String>,
    claimed: &HashSet<String>,
) -> String {
    if existing.contains(&element.id) && !claimed.contains(&element.id) {
        return element.id.clone();
    }
    let component = &element.component;
    let base = format!(
        "{}-{}",
        naming::node_generate_name(project, graph, &component.module, &component.component),
        naming::import_suffix(&element.id)
    );
    if !claimed.contains(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !claimed.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Copies the presentational state and handle configurations of `element`
/// onto `node`, replacing its handle-level configurations.
fn apply_element(node: &mut Node, graph: &str, element: &ExportNode) {
    node.spec.component.version.clone_from(&element.component.version);
    node.set_position(element.position);
    node.set_rotation(element.rotation);
    if let Some(label) = &element.label {
        node.set_display_label(label.as_str());
    }
    if let Some(comment) = &element.comment {
        node.set_comment(comment.as_str());
    }
    node.set_dashboard(element.dashboard);

    node.spec.ports.retain(|pc| !pc.is_handle_level());
    for handle in element.handles.iter().filter(|h| !h.is_empty()) {
        let mut config = PortConfig::handle(handle.id.as_str()).with_graph(graph);
        config.configuration.clone_from(&handle.configuration);
        config.schema.clone_from(&handle.schema);
        node.upsert_port_config(config);
    }
}

/// Edge for the source node and, when the element carries any, the
/// edge-level configuration for the target node
fn edge_writes(element: &ExportEdge, source: &str, target: &str, graph: &str) -> (Edge, Option<PortConfig>) {
    let from = PortRef::new(source, element.source_port.as_str());
    let to = PortRef::new(target, element.target_port.as_str());
    let edge = Edge::new(Edge::derived_id(&from, &to), from.port.as_str(), &to, graph);
    let config = (element.configuration.is_some() || element.schema.is_some()).then(|| PortConfig {
        configuration: element.configuration.clone(),
        schema: element.schema.clone(),
        ..PortConfig::edge(&from, to.port.as_str()).with_graph(graph)
    });
    (edge, config)
}

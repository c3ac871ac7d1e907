//! Project export

use crate::error::SyncError;
use flowsync_gateway::{NodeFilter, ObjectStore};
use flowsync_model::keys::CONTROL_PORT;
use flowsync_model::{
    ExportDocument, ExportEdge, ExportElement, ExportGraph, ExportHandle, ExportNode, ExportPage,
    Node,
};
use std::collections::BTreeMap;

/// Serializes the description and every graph, node, edge and dashboard
/// page of `project`
///
/// Edge configuration is read from the target's edge-level port
/// configuration. Control port configuration is runtime state and is
/// left out. An unreadable description exports as empty.
pub async fn export_project(store: &dyn ObjectStore, project: &str) -> Result<ExportDocument, SyncError> {
    if project.is_empty() {
        return Err(SyncError::invalid("project is required"));
    }
    let description = store
        .get_project_description(project)
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(project, error = %err, "project description unavailable");
            String::new()
        });
    let mut document = ExportDocument::new(description);

    document.graphs = store
        .list_graphs(project)
        .await?
        .into_iter()
        .map(|g| ExportGraph {
            resource_name: g.name,
            name: g.display_name,
        })
        .collect();

    let nodes: BTreeMap<String, Node> = store
        .list_nodes(&NodeFilter::project(project))
        .await?
        .into_iter()
        .map(|n| (n.name.clone(), n))
        .collect();

    for node in nodes.values() {
        document.elements.push(ExportElement::Node(export_node(node)));
    }
    for node in nodes.values() {
        for edge in &node.spec.edges {
            let Ok(target) = edge.target() else {
                tracing::warn!(node = %node.name, edge = %edge.id, "skipping edge with malformed target");
                continue;
            };
            let from = format!("{}:{}", node.name, edge.port);
            let config = nodes
                .get(&target.node)
                .and_then(|t| t.edge_config(&from, &target.port));
            document.elements.push(ExportElement::Edge(ExportEdge {
                id: edge.id.clone(),
                owning_graph: node.owning_graph().unwrap_or_default().to_string(),
                source: node.name.clone(),
                source_port: edge.port.clone(),
                target: target.node,
                target_port: target.port,
                configuration: config.and_then(|pc| pc.configuration.clone()),
                schema: config.and_then(|pc| pc.schema.clone()),
            }));
        }
    }

    document.pages = store
        .list_pages(project)
        .await?
        .into_iter()
        .map(|p| ExportPage {
            name: p.name,
            title: p.title,
            sort_index: p.sort_index,
            widgets: p.widgets,
        })
        .collect();

    tracing::info!(
        project,
        graphs = document.graphs.len(),
        elements = document.elements.len(),
        pages = document.pages.len(),
        "project exported"
    );
    Ok(document)
}

fn export_node(node: &Node) -> ExportNode {
    let handles = node
        .spec
        .ports
        .iter()
        .filter(|pc| pc.is_handle_level())
        .map(|pc| ExportHandle {
            id: pc.port.clone(),
            configuration: if pc.port == CONTROL_PORT {
                None
            } else {
                pc.configuration.clone()
            },
            schema: pc.schema.clone(),
        })
        .filter(|h| !h.is_empty())
        .collect();

    ExportNode {
        id: node.name.clone(),
        owning_graph: node.owning_graph().unwrap_or_default().to_string(),
        component: node.spec.component.clone(),
        label: node.display_label().map(str::to_string),
        comment: node.comment().map(str::to_string),
        position: node.position(),
        rotation: node.rotation(),
        dashboard: node.is_dashboard(),
        handles,
    }
}

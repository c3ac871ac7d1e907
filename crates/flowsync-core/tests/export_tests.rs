use flowsync_core::{export_project, Importer, SyncConfig};
use flowsync_gateway::{GraphStore, MemoryStore, NodeStore, PageStore, ProjectStore};
use flowsync_model::keys::CONTROL_PORT;
use flowsync_model::{ExportDocument, ExportElement, Page, PortConfig, PortRef, WidgetPlacement};
use flowsync_test_utils::{dashboard_node, handle, node, node_with_edge, PROJECT};
use serde_json::json;

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.update_project_description(PROJECT, "snapshot").await.unwrap();
    let graph = store.create_graph(PROJECT, "Main").await.unwrap();
    let g = graph.name.as_str();

    store.create_node(node_with_edge("a", g, "b")).await.unwrap();
    let mut b = node("b", g);
    b.set_display_label("Sink");
    b.upsert_port_config(
        PortConfig::edge(&PortRef::new("a", "out"), "in").with_configuration(json!({ "field": "x" })),
    );
    store.create_node(b).await.unwrap();

    let mut button = dashboard_node("button", g);
    button.upsert_port_config(handle(CONTROL_PORT, json!({ "pressed": true })));
    button.upsert_port_config(handle("settings", json!({ "color": "red" })));
    store.create_node(button).await.unwrap();

    store
        .create_page(
            Page::new("", PROJECT, "Controls")
                .with_sort_index(1)
                .with_widget(WidgetPlacement::new(PortRef::new("button", CONTROL_PORT), 0, 0)),
        )
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_export_document_contents() {
    let store = seeded_store().await;
    let doc = export_project(&store, PROJECT).await.unwrap();

    assert_eq!(doc.description, "snapshot");
    assert_eq!(doc.graphs.len(), 1);
    assert_eq!(doc.graphs[0].name, "Main");
    assert_eq!(doc.nodes().count(), 3);
    assert_eq!(doc.pages.len(), 1);

    let edge = doc.edges().next().unwrap();
    assert_eq!((edge.source.as_str(), edge.target.as_str()), ("a", "b"));
    assert_eq!(edge.owning_graph, doc.graphs[0].resource_name);
    assert_eq!(edge.configuration, Some(json!({ "field": "x" })));

    let button = doc.nodes().find(|n| n.id == "button").unwrap();
    assert!(button.dashboard);
    assert!(button.handles.iter().all(|h| h.id != CONTROL_PORT || h.configuration.is_none()));
    assert!(button.handles.iter().any(|h| h.id == "settings"));

    // Nodes precede edges
    let first_edge = doc.elements.iter().position(|e| matches!(e, ExportElement::Edge(_))).unwrap();
    assert!(doc.elements[..first_edge].iter().all(|e| matches!(e, ExportElement::Node(_))));
}

#[tokio::test]
async fn test_export_then_import_into_fresh_store() {
    let source = seeded_store().await;
    let raw = export_project(&source, PROJECT)
        .await
        .unwrap()
        .to_json_pretty()
        .unwrap();
    assert_eq!(ExportDocument::from_json(&raw).unwrap().version, 1);

    let target = MemoryStore::new();
    let config = SyncConfig::default();
    let report = Importer::new(&target, &config)
        .import_json("copy", &raw)
        .await
        .unwrap();

    assert_eq!(report.nodes_created.len(), 3);
    assert_eq!(report.edges_written, 1);
    assert_eq!(target.get_project_description("copy").await.unwrap(), "snapshot");
    assert_eq!(target.list_graphs("copy").await.unwrap().len(), 1);

    let a = target.node(&report.nodes_created["a"]).unwrap();
    let b_name = &report.nodes_created["b"];
    assert_eq!(a.spec.edges[0].to, format!("{b_name}:in"));
    let b = target.node(b_name).unwrap();
    assert_eq!(b.display_label(), Some("Sink"));
    assert!(b.edge_config(&format!("{}:out", a.name), "in").is_some());

    let button = target.node(&report.nodes_created["button"]).unwrap();
    assert!(button.is_dashboard());
    assert!(button.handle_config(CONTROL_PORT).is_none());

    let pages = target.list_pages("copy").await.unwrap();
    assert_eq!(pages[0].widgets[0].port.node, button.name);
}

#[tokio::test]
async fn test_export_requires_project() {
    let store = MemoryStore::new();
    assert!(export_project(&store, "").await.is_err());
    let empty = export_project(&store, "nothing").await.unwrap();
    assert!(empty.elements.is_empty());
    assert_eq!(empty.description, "");
}

#[tokio::test]
async fn test_export_reads_live_node_state() {
    let store = seeded_store().await;
    let mut a = store.get_node("a").await.unwrap();
    a.set_rotation(3);
    store.update_node(a).await.unwrap();
    let doc = export_project(&store, PROJECT).await.unwrap();
    assert_eq!(doc.nodes().find(|n| n.id == "a").unwrap().rotation, 3);
}

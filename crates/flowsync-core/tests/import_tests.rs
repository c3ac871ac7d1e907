use flowsync_core::{ImportError, Importer, SyncConfig};
use flowsync_gateway::{Fault, GraphStore, MemoryStore, NodeStore, PageStore, ProjectStore};
use flowsync_model::keys::CONTROL_PORT;
use flowsync_model::{ComponentRef, ExportDocument, ModelError, Node, PortRef};
use flowsync_test_utils::PROJECT;
use serde_json::json;
use std::time::Duration;

fn config() -> SyncConfig {
    SyncConfig::default().with_readiness(Duration::from_millis(5), Duration::from_millis(500))
}

fn document() -> String {
    json!({
        "version": 1,
        "description": "pipeline",
        "graphs": [{ "resourceName": "old-graph-1", "name": "Main" }],
        "elements": [
            { "type": "node", "id": "source-ab12c", "owningGraph": "old-graph-1",
              "component": { "module": "common", "component": "source", "version": "1.0.0" },
              "label": "Source", "position": { "x": 10.0, "y": 20.0 }, "rotation": 1,
              "handles": [{ "id": "settings", "configuration": { "rate": 5 } }] },
            { "type": "node", "id": "sink-zz9q1", "owningGraph": "old-graph-1",
              "component": { "module": "common", "component": "sink" }, "dashboard": true,
              "handles": [{ "id": "_control", "schema": { "type": "object" } }] },
            { "type": "edge", "id": "e1", "owningGraph": "old-graph-1",
              "source": "source-ab12c", "sourcePort": "out",
              "target": "sink-zz9q1", "targetPort": "in",
              "configuration": { "map": "payload" } },
            { "type": "edge", "id": "e2", "owningGraph": "old-graph-1",
              "source": "source-ab12c", "sourcePort": "out",
              "target": "not-in-document", "targetPort": "in" }
        ],
        "pages": [{
            "name": "page-1", "title": "Overview", "sortIndex": 0,
            "widgets": [
                { "port": "sink-zz9q1:_control", "gridX": 0, "gridY": 0, "gridW": 3, "gridH": 4 },
                { "port": "gone:_control", "gridX": 3, "gridY": 0, "gridW": 3, "gridH": 4 }
            ]
        }]
    })
    .to_string()
}

#[tokio::test]
async fn test_import_skips_unresolvable_edge() {
    let store = MemoryStore::new();
    let config = config();
    let report = Importer::new(&store, &config)
        .import_json(PROJECT, &document())
        .await
        .unwrap();

    assert_eq!(report.graphs_created.len(), 1);
    assert_eq!(report.nodes_created.len(), 2);
    assert_eq!(report.edges_written, 1);
    assert_eq!(report.edges_skipped, 1);
    assert_eq!(report.pages_created.len(), 1);

    let graph = &report.graphs_created["old-graph-1"];
    let source_name = &report.nodes_created["source-ab12c"];
    let sink_name = &report.nodes_created["sink-zz9q1"];
    assert!(source_name.starts_with("source-") && source_name.ends_with("-ab12c"));

    let source = store.node(source_name).unwrap();
    assert!(source.is_owned_by(graph));
    assert_eq!(source.rotation(), 1);
    assert_eq!(source.display_label(), Some("Source"));
    assert_eq!(source.spec.component.version, "1.0.0");
    assert_eq!(source.spec.edges.len(), 1);
    assert_eq!(source.spec.edges[0].to, format!("{sink_name}:in"));

    // Edge-level configuration lives on the target
    let sink = store.node(sink_name).unwrap();
    assert!(sink.is_dashboard());
    let config = sink.edge_config(&format!("{source_name}:out"), "in").unwrap();
    assert_eq!(config.configuration, Some(json!({ "map": "payload" })));

    let pages = store.list_pages(PROJECT).await.unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].title, "Overview");
    assert_eq!(pages[0].widgets.len(), 1);
    assert_eq!(pages[0].widgets[0].port, PortRef::new(sink_name.as_str(), CONTROL_PORT));
}

#[tokio::test]
async fn test_import_twice_creates_no_duplicates() {
    let store = MemoryStore::new();
    let config = config();
    let importer = Importer::new(&store, &config);
    importer.import_json(PROJECT, &document()).await.unwrap();
    let nodes_before = store.nodes().len();
    let edges_before: usize = store.nodes().iter().map(|n| n.spec.edges.len()).sum();

    let second = importer.import_json(PROJECT, &document()).await.unwrap();

    assert!(second.graphs_created.is_empty());
    assert!(second.nodes_created.is_empty());
    assert_eq!(second.nodes_updated.len(), 2);
    assert_eq!(second.pages_skipped, vec!["Overview".to_string()]);
    assert_eq!(store.nodes().len(), nodes_before);
    let edges_after: usize = store.nodes().iter().map(|n| n.spec.edges.len()).sum();
    assert_eq!(edges_after, edges_before);
    assert_eq!(store.list_graphs(PROJECT).await.unwrap().len(), 1);
    assert_eq!(store.list_pages(PROJECT).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_existing_id_is_updated_in_place() {
    let store = MemoryStore::new();
    let graph = store.create_graph(PROJECT, "Main").await.unwrap();
    let mut existing = Node::new("source-ab12c", PROJECT, graph.name.as_str(), ComponentRef::new("common", "source"));
    existing.set_comment("keep me");
    store.create_node(existing).await.unwrap();

    let config = config();
    let report = Importer::new(&store, &config)
        .import_json(PROJECT, &document())
        .await
        .unwrap();

    // Graph reused by display name
    assert!(report.graphs_created.is_empty());
    assert!(report.nodes_updated.contains(&"source-ab12c".to_string()));
    let updated = store.node("source-ab12c").unwrap();
    assert_eq!(updated.position().x, 10.0);
    assert_eq!(updated.comment(), Some("keep me"));
    assert_eq!(
        updated.handle_config("settings").and_then(|pc| pc.configuration.clone()),
        Some(json!({ "rate": 5 }))
    );
    assert_eq!(store.nodes().len(), 2);
}

#[tokio::test]
async fn test_partial_failure_commits_the_rest() {
    let store = MemoryStore::new();
    store.inject(Fault::CreateNode { component: "sink".into() });
    let config = config();

    let err = Importer::new(&store, &config)
        .import_json(PROJECT, &document())
        .await
        .unwrap_err();
    let report = err.report().unwrap();
    assert_eq!(report.failed_nodes.len(), 1);
    assert_eq!(report.failed_nodes[0].id, "sink-zz9q1");
    assert_eq!(report.nodes_created.len(), 1);
    // Both edges lose an endpoint
    assert_eq!(report.edges_skipped, 2);
    assert!(err.to_string().contains("sink-zz9q1"));
    assert_eq!(store.nodes().len(), 1);
    // The only widget pointed at the failed node
    let pages = store.list_pages(PROJECT).await.unwrap();
    assert_eq!(pages.len(), 1);
    assert!(pages[0].widgets.is_empty());
}

#[tokio::test]
async fn test_failed_page_is_reported() {
    let store = MemoryStore::new();
    store.inject(Fault::CreatePage { title: "Overview".into() });
    let config = config();
    let err = Importer::new(&store, &config)
        .import_json(PROJECT, &document())
        .await
        .unwrap_err();
    let ImportError::Partial { report } = err else {
        panic!("expected partial failure");
    };
    assert_eq!(report.failed_pages[0].id, "Overview");
    assert_eq!(report.nodes_created.len(), 2);
}

#[tokio::test]
async fn test_rejects_other_versions_before_writing() {
    let store = MemoryStore::new();
    let config = config();
    let raw = document().replacen("\"version\":1", "\"version\":7", 1);
    let err = Importer::new(&store, &config)
        .import_json(PROJECT, &raw)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ImportError::Document(ModelError::UnsupportedVersion { found: 7, expected: 1 })
    ));
    assert!(store.nodes().is_empty());
    assert!(store.list_graphs(PROJECT).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_typed_document_with_other_version_is_rejected() {
    let store = MemoryStore::new();
    let config = config();
    let mut doc = ExportDocument::from_json(&document()).unwrap();
    doc.version = 7;

    let err = Importer::new(&store, &config).import(PROJECT, &doc).await.unwrap_err();

    assert!(matches!(
        err,
        ImportError::Document(ModelError::UnsupportedVersion { found: 7, expected: 1 })
    ));
    assert!(store.nodes().is_empty());
    assert!(store.list_graphs(PROJECT).await.unwrap().is_empty());
    assert_eq!(store.get_project_description(PROJECT).await.unwrap(), "");
}

#[tokio::test]
async fn test_description_is_saved() {
    let store = MemoryStore::new();
    let config = config();
    let report = Importer::new(&store, &config)
        .import_json(PROJECT, &document())
        .await
        .unwrap();
    assert!(report.description_error.is_none());
    assert_eq!(store.get_project_description(PROJECT).await.unwrap(), "pipeline");
}

#[tokio::test]
async fn test_description_failure_does_not_abort() {
    let store = MemoryStore::new();
    store.inject(Fault::UpdateProjectDescription { project: PROJECT.into() });
    let config = config();
    let report = Importer::new(&store, &config)
        .import_json(PROJECT, &document())
        .await
        .unwrap();

    assert!(report.description_error.is_some());
    assert!(report.is_success());
    assert_eq!(report.nodes_created.len(), 2);
    assert_eq!(report.edges_written, 1);
}

#[tokio::test]
async fn test_colliding_names_get_distinct_nodes() {
    let raw = json!({
        "version": 1,
        "graphs": [{ "resourceName": "old-graph-1", "name": "Main" }],
        "elements": [
            { "type": "node", "id": "source-ab12c", "owningGraph": "old-graph-1",
              "component": { "module": "common", "component": "source" } },
            { "type": "node", "id": "copy-ab12c", "owningGraph": "old-graph-1",
              "component": { "module": "common", "component": "source" } },
            { "type": "edge", "id": "e1", "owningGraph": "old-graph-1",
              "source": "source-ab12c", "sourcePort": "out",
              "target": "copy-ab12c", "targetPort": "in" }
        ]
    })
    .to_string();
    let store = MemoryStore::new();
    let config = config();
    let importer = Importer::new(&store, &config);

    let report = importer.import_json(PROJECT, &raw).await.unwrap();
    let first = &report.nodes_created["source-ab12c"];
    let second = &report.nodes_created["copy-ab12c"];
    assert_ne!(first, second);
    assert_eq!(second, &format!("{first}-2"));
    assert_eq!(store.node(first).unwrap().spec.edges[0].to, format!("{second}:in"));

    // The numbering is stable, so a second import updates both nodes
    let again = importer.import_json(PROJECT, &raw).await.unwrap();
    assert!(again.nodes_created.is_empty());
    assert_eq!(again.nodes_updated.len(), 2);
    assert_eq!(store.nodes().len(), 2);
}

#[tokio::test]
async fn test_rejects_empty_project() {
    let store = MemoryStore::new();
    let config = config();
    let doc = ExportDocument::new("empty");
    assert!(matches!(
        Importer::new(&store, &config).import("", &doc).await,
        Err(ImportError::InvalidInput(_))
    ));
}

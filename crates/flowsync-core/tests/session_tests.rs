use flowsync_core::{
    BuildOptions, DataSource, GraphSession, GraphUpdate, SessionScope, SyncConfig, SyncError,
};
use flowsync_gateway::{MemoryStore, NodeStore, StatSample, StatsHub};
use flowsync_model::{keys, Graph, GraphElement, PortRef};
use flowsync_test_utils::{node, node_with_edge, AcceptAll, RecordingSink, Rejecting, PROJECT};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn store_with_graphs() -> MemoryStore {
    let store = MemoryStore::new();
    let mut g1 = Graph::new("g1", PROJECT, "Main");
    g1.annotations.insert(keys::VIEWPORT_X.to_string(), "10".into());
    g1.annotations.insert(keys::VIEWPORT_ZOOM.to_string(), "1.5".into());
    store.put_graph(g1);
    store.put_graph(Graph::new("g2", PROJECT, "Other"));
    store
}

fn session(store: &MemoryStore, sink: &Arc<RecordingSink>, config: SyncConfig) -> GraphSession {
    GraphSession::new(Arc::new(store.clone()), Arc::new(AcceptAll), sink.clone(), config)
}

#[tokio::test]
async fn test_start_returns_initial_graph() {
    let store = store_with_graphs();
    store.create_node(node("b", "g1")).await.unwrap();
    store.create_node(node_with_edge("a", "g1", "b")).await.unwrap();
    store.create_node(node_with_edge("c", "g1", "missing")).await.unwrap();
    store.create_node(node("foreign", "g2")).await.unwrap();

    let sink = Arc::new(RecordingSink::new());
    let session = session(&store, &sink, SyncConfig::default());
    let editor = session.start(SessionScope::new(PROJECT, "g1")).await.unwrap();

    assert_eq!(editor.graph.display_name, "Main");
    assert_eq!(editor.viewport.x, Some(10.0));
    assert_eq!(editor.viewport.y, None);
    assert_eq!(editor.viewport.zoom, Some(1.5));

    let ids: Vec<&str> = editor.elements.iter().map(GraphElement::id).collect();
    assert!(ids.contains(&"a") && ids.contains(&"b") && ids.contains(&"c"));
    assert!(!ids.contains(&"foreign"));
    assert!(editor
        .elements
        .iter()
        .any(|e| matches!(e, GraphElement::Edge(r) if r.target == "b" && r.valid)));
    // Unknown target degrades, it is not dropped
    assert!(editor
        .elements
        .iter()
        .any(|e| matches!(e, GraphElement::FallbackEdge(r) if r.target == "missing")));

    session.stop().await;
}

#[tokio::test]
async fn test_edge_events_precede_node_event() {
    let store = store_with_graphs();
    store.create_node(node("b", "g1")).await.unwrap();
    let sink = Arc::new(RecordingSink::new());
    let session = session(&store, &sink, SyncConfig::default());
    session.start(SessionScope::new(PROJECT, "g1")).await.unwrap();

    store.create_node(node_with_edge("a", "g1", "b")).await.unwrap();
    assert!(sink.wait_until(WAIT, |s| s.changes().len() >= 2).await);

    let changes = sink.changes();
    assert!(matches!(&changes[0], GraphUpdate::Added { id, record } if id == "a_out-b_in" && record.is_edge()));
    assert!(matches!(&changes[1], GraphUpdate::Added { id, .. } if id == "a"));
    session.stop().await;
}

#[tokio::test]
async fn test_foreign_nodes_are_filtered() {
    let store = store_with_graphs();
    let sink = Arc::new(RecordingSink::new());
    let session = session(&store, &sink, SyncConfig::default());
    session.start(SessionScope::new(PROJECT, "g1")).await.unwrap();

    store.create_node(node("foreign", "g2")).await.unwrap();
    store.create_node(node("marker", "g1")).await.unwrap();
    assert!(sink.wait_until(WAIT, |s| !s.changes().is_empty()).await);

    let changes = sink.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].id(), Some("marker"));
    session.stop().await;
}

#[tokio::test]
async fn test_delete_and_visibility_loss() {
    let store = store_with_graphs();
    store.create_node(node("a", "g1")).await.unwrap();
    store.create_node(node("b", "g1")).await.unwrap();
    let sink = Arc::new(RecordingSink::new());
    let session = session(&store, &sink, SyncConfig::default());
    session.start(SessionScope::new(PROJECT, "g1")).await.unwrap();

    store.delete_node("a").await.unwrap();
    let mut moved = store.get_node("b").await.unwrap();
    moved.set_owning_graph("g2");
    store.update_node(moved).await.unwrap();

    assert!(sink.wait_until(WAIT, |s| s.changes().len() >= 2).await);
    let changes = sink.changes();
    assert_eq!(changes[0], GraphUpdate::Deleted { id: "a".into() });
    assert_eq!(changes[1], GraphUpdate::Deleted { id: "b".into() });
    assert!(changes.iter().all(|c| c.record().is_none()));
    session.stop().await;
}

#[tokio::test]
async fn test_shared_node_is_blocked() {
    let store = store_with_graphs();
    let mut shared = node("s", "g2");
    shared.add_shared_graph("g1");
    store.create_node(shared).await.unwrap();

    let sink = Arc::new(RecordingSink::new());
    let session = session(&store, &sink, SyncConfig::default());
    let editor = session.start(SessionScope::new(PROJECT, "g1")).await.unwrap();

    let record = editor
        .elements
        .iter()
        .find_map(|e| match e {
            GraphElement::Node(n) if n.id == "s" => Some(n),
            _ => None,
        })
        .unwrap();
    assert!(record.blocked);
    assert!(record.shared);
    session.stop().await;
}

#[tokio::test]
async fn test_heartbeat_ticks() {
    let store = store_with_graphs();
    let sink = Arc::new(RecordingSink::new());
    let config = SyncConfig::default().with_heartbeat(Duration::from_millis(20));
    let session = session(&store, &sink, config);
    session.start(SessionScope::new(PROJECT, "g1")).await.unwrap();

    assert!(sink.wait_until(WAIT, |s| s.ticks() >= 3).await);
    session.stop().await;
}

#[tokio::test]
async fn test_restart_replaces_watch() {
    let store = store_with_graphs();
    let sink = Arc::new(RecordingSink::new());
    let session = session(&store, &sink, SyncConfig::default());

    session.start(SessionScope::new(PROJECT, "g1")).await.unwrap();
    assert_eq!(store.watcher_count(), 1);
    session.start(SessionScope::new(PROJECT, "g2")).await.unwrap();
    assert_eq!(store.watcher_count(), 1);
    assert_eq!(session.scope().await.unwrap().graph, "g2");

    // Only the g2 watch is live
    store.create_node(node("in-g1", "g1")).await.unwrap();
    store.create_node(node("in-g2", "g2")).await.unwrap();
    assert!(sink.wait_until(WAIT, |s| !s.changes().is_empty()).await);
    assert_eq!(sink.changes().len(), 1);
    assert_eq!(sink.changes()[0].id(), Some("in-g2"));

    session.stop().await;
    assert_eq!(store.watcher_count(), 0);
    session.stop().await;
    assert!(!session.is_active().await);
}

#[tokio::test]
async fn test_start_rejects_empty_scope() {
    let store = store_with_graphs();
    let sink = Arc::new(RecordingSink::new());
    let session = session(&store, &sink, SyncConfig::default());
    assert!(matches!(
        session.start(SessionScope::new("", "g1")).await,
        Err(SyncError::InvalidInput(_))
    ));
    assert!(matches!(
        session.start(SessionScope::new(PROJECT, "")).await,
        Err(SyncError::InvalidInput(_))
    ));
    assert_eq!(store.watcher_count(), 0);
}

#[tokio::test]
async fn test_inspect_port() {
    let store = store_with_graphs();
    let mut a = node("a", "g1");
    a.upsert_port_config(flowsync_test_utils::handle("in", json!({ "rate": 5 })));
    store.create_node(a).await.unwrap();

    let sink = Arc::new(RecordingSink::new());
    let session = session(&store, &sink, SyncConfig::default());
    let port = PortRef::new("a", "in");
    assert!(matches!(session.inspect_port(&port, None).await, Err(SyncError::NotStarted)));

    session.start(SessionScope::new(PROJECT, "g1")).await.unwrap();
    let simulated = session.inspect_port(&port, None).await.unwrap();
    assert_eq!(simulated.data_source, DataSource::Simulated);
    assert_eq!(simulated.configuration, Some(json!({ "rate": 5 })));
    assert_eq!(simulated.label, "in");

    let runtime = session.inspect_port(&port, Some(json!({ "v": 1 }))).await.unwrap();
    assert_eq!(runtime.data_source, DataSource::Runtime);
    assert_eq!(runtime.data, Some(json!({ "v": 1 })));

    assert!(matches!(
        session.inspect_port(&PortRef::new("zzz", "in"), None).await,
        Err(SyncError::UnknownNode(_))
    ));
    session.stop().await;
}

#[tokio::test]
async fn test_inspect_failure_is_data() {
    let store = store_with_graphs();
    store.create_node(node("a", "g1")).await.unwrap();
    let sink = Arc::new(RecordingSink::new());
    let session = GraphSession::new(
        Arc::new(store.clone()),
        Arc::new(Rejecting("engine offline".into())),
        sink.clone(),
        SyncConfig::default(),
    );
    session.start(SessionScope::new(PROJECT, "g1")).await.unwrap();
    let inspection = session.inspect_port(&PortRef::new("a", "out"), None).await.unwrap();
    assert!(inspection.data.is_none());
    assert_eq!(inspection.data_error.as_deref(), Some("engine offline"));
    session.stop().await;
}

#[tokio::test]
async fn test_snapshot_with_trace_overlay() {
    let store = store_with_graphs();
    store.create_node(node("b", "g1")).await.unwrap();
    store.create_node(node_with_edge("a", "g1", "b")).await.unwrap();
    let sink = Arc::new(RecordingSink::new());
    let session = session(&store, &sink, SyncConfig::default());
    session.start(SessionScope::new(PROJECT, "g1")).await.unwrap();

    let options = BuildOptions::default().with_runtime_sample(&PortRef::new("a", "out"), json!({ "x": 1 }));
    let elements = session.snapshot(options).await.unwrap();
    assert_eq!(elements.len(), 3);
    assert!(elements.iter().all(GraphElement::is_valid));
    session.stop().await;
}

#[tokio::test]
async fn test_stats_are_forwarded_with_prefix() {
    let store = store_with_graphs();
    let hub = Arc::new(StatsHub::new());
    let sink = Arc::new(RecordingSink::new());
    let session = session(&store, &sink, SyncConfig::default()).with_stats(hub.clone());
    session.start(SessionScope::new(PROJECT, "g1")).await.unwrap();

    let samples = vec![
        StatSample::new("e1", "edge_rate", 2.0),
        StatSample::new("e1", "cpu", 9.0),
        StatSample::new("", "edge_rate", 1.0),
    ];
    assert!(sink.wait_until(WAIT, |_| hub.subscriber_count() > 0).await);
    hub.publish(PROJECT, "g1", &samples);

    assert!(sink.wait_until(WAIT, |s| !s.changes().is_empty()).await);
    match &sink.changes()[0] {
        GraphUpdate::Stats { batch } => {
            assert_eq!(batch.len(), 1);
            assert_eq!(batch["e1"].len(), 1);
            assert_eq!(batch["e1"]["edge_rate"], 2.0);
        }
        other => panic!("unexpected {other:?}"),
    }
    session.stop().await;
}

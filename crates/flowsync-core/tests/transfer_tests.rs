use flowsync_core::{transfer, TransferError, TransferRequest, TransferStep};
use flowsync_gateway::{Fault, MemoryStore, NodeStore};
use flowsync_model::{Node, PortConfig, PortRef};
use flowsync_test_utils::{node, node_with_edge, PROJECT};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

fn request(nodes: &[&str]) -> TransferRequest {
    TransferRequest::new(PROJECT, "g1", "g2", nodes.iter().copied())
}

/// Every edge target and edge-level `from` resolves to a stored node
fn assert_referentially_intact(store: &MemoryStore) {
    let nodes = store.nodes();
    let names: BTreeSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    for n in &nodes {
        for edge in &n.spec.edges {
            assert!(names.contains(edge.target_node()), "{} -> {} dangles", n.name, edge.to);
        }
        for pc in n.spec.ports.iter().filter_map(|pc| pc.from.as_deref()) {
            let from: PortRef = pc.parse().unwrap();
            assert!(names.contains(from.node.as_str()), "{} config from {pc} dangles", n.name);
        }
    }
}

fn by_component_owner<'a>(nodes: &'a [Node], graph: &str) -> Vec<&'a Node> {
    nodes.iter().filter(|n| n.is_owned_by(graph)).collect()
}

#[tokio::test]
async fn test_moves_node_and_shares_neighbour() {
    let store = MemoryStore::new();
    store.create_node(node_with_edge("a", "g1", "b")).await.unwrap();
    store.create_node(node("b", "g1")).await.unwrap();

    let outcome = transfer(&store, &request(&["a"])).await.unwrap();

    let new_a = outcome.moved["a"].clone();
    assert!(new_a.starts_with("router-"));
    assert_eq!(outcome.shared, vec!["b".to_string()]);
    assert!(store.node("a").is_none());

    let moved = store.node(&new_a).unwrap();
    assert!(moved.is_owned_by("g2"));
    assert_eq!(moved.spec.edges[0].to, "b:in");
    assert_eq!(moved.spec.edges[0].graph_id, "g2");
    assert_eq!(moved.shared_with().count(), 0);
    assert!(moved.meta.uid.is_some());

    let b = store.node("b").unwrap();
    assert!(b.is_owned_by("g1"));
    assert!(b.is_shared_with("g2"));
    assert_eq!(store.nodes().len(), 2);
    assert_referentially_intact(&store);
}

#[tokio::test]
async fn test_second_transfer_is_noop() {
    let store = MemoryStore::new();
    store.create_node(node_with_edge("a", "g1", "b")).await.unwrap();
    store.create_node(node("b", "g1")).await.unwrap();

    transfer(&store, &request(&["a"])).await.unwrap();
    let before = store.nodes();
    let again = transfer(&store, &request(&["a"])).await.unwrap();

    assert!(again.is_noop());
    assert_eq!(again.skipped, vec!["a".to_string()]);
    assert_eq!(store.nodes(), before);
}

#[tokio::test]
async fn test_incoming_references_are_rewritten() {
    let store = MemoryStore::new();
    store.create_node(node("a", "g1")).await.unwrap();
    // c (g1) feeds a; d already lives in g2 and feeds a too
    store.create_node(node_with_edge("c", "g1", "a")).await.unwrap();
    store.create_node(node_with_edge("d", "g2", "a")).await.unwrap();
    // b stores edge-level configuration for the edge a:out -> b:in
    let mut b = node("b", "g1");
    b.upsert_port_config(PortConfig::edge(&PortRef::new("a", "out"), "in"));
    store.create_node(b).await.unwrap();

    let outcome = transfer(&store, &request(&["a"])).await.unwrap();
    let new_a = &outcome.moved["a"];

    let mut shared = outcome.shared.clone();
    shared.sort();
    assert_eq!(shared, vec!["b".to_string(), "c".to_string()]);
    let mut rewritten = outcome.rewritten.clone();
    rewritten.sort();
    assert_eq!(rewritten, vec!["b".to_string(), "c".to_string(), "d".to_string()]);

    assert_eq!(store.node("c").unwrap().spec.edges[0].to, format!("{new_a}:in"));
    assert_eq!(store.node("d").unwrap().spec.edges[0].to, format!("{new_a}:in"));
    assert!(!store.node("d").unwrap().is_shared_with("g2"));
    assert!(store
        .node("b")
        .unwrap()
        .edge_config(&format!("{new_a}:out"), "in")
        .is_some());
    assert_referentially_intact(&store);
}

#[tokio::test]
async fn test_edges_between_moved_nodes_follow_them() {
    let store = MemoryStore::new();
    store.create_node(node_with_edge("a", "g1", "b")).await.unwrap();
    store.create_node(node("b", "g1")).await.unwrap();
    store.create_node(node("other", "g1")).await.unwrap();

    let outcome = transfer(&store, &request(&["a", "b", "ghost"])).await.unwrap();
    assert_eq!(outcome.moved.len(), 2);
    assert_eq!(outcome.skipped, vec!["ghost".to_string()]);
    assert!(outcome.shared.is_empty());

    let moved_a = store.node(&outcome.moved["a"]).unwrap();
    assert_eq!(moved_a.spec.edges[0].to, format!("{}:in", outcome.moved["b"]));
    let nodes = store.nodes();
    assert_eq!(by_component_owner(&nodes, "g2").len(), 2);
    assert_eq!(by_component_owner(&nodes, "g1").len(), 1);
    assert_referentially_intact(&store);
}

#[tokio::test]
async fn test_rejects_empty_request_without_writes() {
    let store = MemoryStore::new();
    store.create_node(node("a", "g1")).await.unwrap();
    let before = store.nodes();

    let empty = TransferRequest::new(PROJECT, "g1", "g2", Vec::<String>::new());
    assert!(matches!(transfer(&store, &empty).await, Err(TransferError::InvalidInput(_))));
    let no_dest = TransferRequest::new(PROJECT, "g1", "", ["a"]);
    assert!(matches!(transfer(&store, &no_dest).await, Err(TransferError::InvalidInput(_))));
    assert_eq!(store.nodes(), before);
}

#[tokio::test]
async fn test_failed_delete_keeps_copy_and_original() {
    let store = MemoryStore::new();
    store.create_node(node_with_edge("a", "g1", "b")).await.unwrap();
    store.create_node(node("b", "g1")).await.unwrap();
    store.inject(Fault::DeleteNode { name: "a".into() });

    let err = transfer(&store, &request(&["a"])).await.unwrap_err();
    match err {
        TransferError::Step { step, node, .. } => {
            assert_eq!(step, TransferStep::Deleting);
            assert_eq!(node, "a");
        }
        other => panic!("unexpected {other}"),
    }
    // Create precedes delete: nothing was lost and nothing dangles
    assert!(store.node("a").is_some());
    assert_eq!(by_component_owner(&store.nodes(), "g2").len(), 1);
    assert_referentially_intact(&store);
}

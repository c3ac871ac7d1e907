//! Visibility rules for a focused graph
//!
//! A node owned by the focus graph is rendered and editable. A node owned
//! elsewhere is blocked; it is rendered only when shared into the focus
//! graph (or when the caller asks for the whole project).

use flowsync_model::Node;

/// Which nodes a build renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildScope {
    /// Owned and shared nodes of the focus graph
    #[default]
    Focus,
    /// Every node of the project; foreign nodes stay blocked
    AllProject,
}

/// Relation of one node to the focus graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub owned: bool,
    pub shared: bool,
}

impl Visibility {
    #[must_use]
    pub fn of(node: &Node, focus: &str) -> Self {
        Self {
            owned: node.is_owned_by(focus),
            shared: node.is_shared_with(focus),
        }
    }

    /// Blocked iff not owned; sharing never unblocks
    #[inline]
    #[must_use]
    pub fn blocked(self) -> bool {
        !self.owned
    }

    #[inline]
    #[must_use]
    pub fn rendered(self, scope: BuildScope) -> bool {
        match scope {
            BuildScope::Focus => self.owned || self.shared,
            BuildScope::AllProject => true,
        }
    }

    /// Edge from a shared-in source is blocked when its target is foreign
    /// to the focus graph as well.
    #[inline]
    #[must_use]
    pub fn edge_blocked(source: Self, target: Self) -> bool {
        source.shared && !source.owned && !target.owned && !target.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsync_model::ComponentRef;
    use proptest::prelude::*;

    fn node(graph: &str, shared: &[&str]) -> Node {
        let mut n = Node::new("n", "p", graph, ComponentRef::new("m", "c"));
        for g in shared {
            n.add_shared_graph(g);
        }
        n
    }

    #[test]
    fn shared_node_is_rendered_but_blocked() {
        let v = Visibility::of(&node("g1", &["g2"]), "g2");
        assert!(v.rendered(BuildScope::Focus));
        assert!(v.blocked());
    }

    #[test]
    fn owned_node_never_blocked() {
        let v = Visibility::of(&node("g1", &["g1"]), "g1");
        assert!(!v.blocked());
    }

    #[test]
    fn edge_blocking() {
        let shared_in = Visibility { owned: false, shared: true };
        let owned = Visibility { owned: true, shared: false };
        let foreign = Visibility { owned: false, shared: false };
        assert!(Visibility::edge_blocked(shared_in, foreign));
        assert!(!Visibility::edge_blocked(shared_in, owned));
        assert!(!Visibility::edge_blocked(shared_in, shared_in));
        assert!(!Visibility::edge_blocked(owned, foreign));
    }

    proptest! {
        #[test]
        fn prop_foreign_unshared_never_rendered(
            owner in "[a-c]",
            focus in "[a-c]",
            shared in proptest::collection::vec("[a-c]", 0..3),
        ) {
            let refs: Vec<&str> = shared.iter().map(String::as_str).collect();
            let n = node(&owner, &refs);
            let v = Visibility::of(&n, &focus);
            if owner != focus && !shared.contains(&focus) {
                prop_assert!(!v.rendered(BuildScope::Focus));
            }
            prop_assert_eq!(v.blocked(), owner != focus);
        }
    }
}

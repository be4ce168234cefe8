//! Route computation between tree nodes.
//!
//! Three strategies are tried in order, short-circuiting on first success:
//! descendant search (source is an ancestor of the target), ascendant search
//! (target is an ancestor of the source), and common-ancestor search (the
//! paths meet at the nearest shared ancestor). Absence of a route is a
//! normal outcome, returned as `None`.

use crate::envelope::NodeId;
use crate::tree::ComponentTree;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::trace;

/// An ordered path of node identities connecting two nodes.
///
/// Only the final hop is dispatched to; earlier hops document provenance.
/// The same-node route is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route(Vec<NodeId>);

impl Route {
    /// Create a route from a sequence of hops.
    #[must_use]
    pub fn new(hops: Vec<NodeId>) -> Self {
        Self(hops)
    }

    /// The hops in traversal order.
    #[must_use]
    pub fn hops(&self) -> &[NodeId] {
        &self.0
    }

    /// The final hop, the identity actual delivery addresses.
    #[must_use]
    pub fn last_hop(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Number of hops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the route has no hops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the route, returning its hops.
    #[must_use]
    pub fn into_hops(self) -> Vec<NodeId> {
        self.0
    }
}

impl From<Vec<NodeId>> for Route {
    fn from(hops: Vec<NodeId>) -> Self {
        Self(hops)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(":"))
    }
}

/// Compute a route from `source` to `target`.
///
/// Returns `None` when no path exists (disjoint trees, unregistered nodes).
#[must_use]
pub fn find_route(tree: &ComponentTree, source: &str, target: &str) -> Option<Route> {
    // Same node: nothing to traverse.
    if source == target {
        return Some(Route::default());
    }

    if let Some(path) = descendant_path(tree, source, target) {
        trace!(source, target, "Route found by descendant search");
        return Some(Route::new(path));
    }

    // Ancestor routes collapse to direct delivery; only the final hop matters.
    if tree.ancestors_of(source).iter().any(|a| a == target) {
        trace!(source, target, "Route found by ascendant search");
        return Some(Route::new(vec![target.to_string()]));
    }

    common_ancestor_path(tree, source, target).map(|hops| {
        trace!(source, target, "Route found by common-ancestor search");
        Route::new(hops)
    })
}

/// Depth-first child-path from `source` to `target`, exclusive of source,
/// inclusive of target.
///
/// Iterative with a visited set: the tree is expected to be acyclic, but a
/// corrupted topology must not hang the search.
fn descendant_path(tree: &ComponentTree, source: &str, target: &str) -> Option<Vec<NodeId>> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    visited.insert(source.to_string());

    let mut came_from: HashMap<NodeId, NodeId> = HashMap::new();
    let mut stack: Vec<NodeId> = tree.children_of(source);
    for child in &stack {
        came_from.insert(child.clone(), source.to_string());
    }
    stack.reverse();

    while let Some(node) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        if node == target {
            let mut path = vec![node.clone()];
            let mut current = node;
            while let Some(prev) = came_from.get(&current) {
                if prev == source {
                    break;
                }
                path.push(prev.clone());
                current = prev.clone();
            }
            path.reverse();
            return Some(path);
        }
        for child in tree.children_of(&node).into_iter().rev() {
            if !visited.contains(&child) {
                came_from.entry(child.clone()).or_insert_with(|| node.clone());
                stack.push(child);
            }
        }
    }
    None
}

/// Path through the nearest common ancestor: source's ancestors up to and
/// including the ancestor, then the child-path down to the target.
fn common_ancestor_path(tree: &ComponentTree, source: &str, target: &str) -> Option<Vec<NodeId>> {
    let source_path = tree.ancestors_of(source);
    let target_path = tree.ancestors_of(target);
    let target_set: HashSet<&str> = target_path.iter().map(String::as_str).collect();

    // Scan the source path nearest-first; the first member shared with the
    // target path is the nearest common ancestor. The paths may differ in
    // length, so this is a membership test, not a positional comparison.
    let ancestor_idx = source_path
        .iter()
        .position(|a| target_set.contains(a.as_str()))?;

    let mut hops: Vec<NodeId> = source_path[..=ancestor_idx].to_vec();
    // The second leg excludes the ancestor itself to avoid duplication.
    hops.extend(descendant_path(tree, &source_path[ancestor_idx], target)?);
    Some(hops)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(tree: &ComponentTree, ids: &[&str]) {
        let mut parent: Option<&str> = None;
        for id in ids {
            tree.attach(id, parent).unwrap();
            parent = Some(id);
        }
    }

    /// Branchy tree for common-ancestor cases: a -> b, a -> c, b -> d.
    fn branchy() -> ComponentTree {
        let tree = ComponentTree::new();
        tree.attach("a", None).unwrap();
        tree.attach("b", Some("a")).unwrap();
        tree.attach("c", Some("a")).unwrap();
        tree.attach("d", Some("b")).unwrap();
        tree
    }

    #[test]
    fn test_same_node_route_is_empty() {
        let tree = ComponentTree::new();
        tree.attach("a", None).unwrap();
        let route = find_route(&tree, "a", "a").unwrap();
        assert!(route.is_empty());
        assert!(route.last_hop().is_none());
    }

    #[test]
    fn test_descendant_route() {
        let tree = ComponentTree::new();
        chain(&tree, &["a", "b", "c"]);
        let route = find_route(&tree, "a", "c").unwrap();
        assert_eq!(route.hops(), ["b", "c"]);
    }

    #[test]
    fn test_descendant_route_across_branches() {
        let tree = branchy();
        tree.attach("e", Some("d")).unwrap();
        let route = find_route(&tree, "a", "e").unwrap();
        assert_eq!(route.hops(), ["b", "d", "e"]);
    }

    #[test]
    fn test_ancestor_route_collapses_to_target() {
        let tree = ComponentTree::new();
        chain(&tree, &["a", "b", "c"]);
        let route = find_route(&tree, "c", "a").unwrap();
        assert_eq!(route.hops(), ["a"]);
    }

    #[test]
    fn test_common_ancestor_route_has_both_legs() {
        let tree = branchy();
        let route = find_route(&tree, "d", "c").unwrap();
        // Up-leg b, a (ancestor inclusive), down-leg c (ancestor exclusive).
        assert_eq!(route.hops(), ["b", "a", "c"]);
        assert_eq!(route.last_hop(), Some("c"));
    }

    #[test]
    fn test_sibling_route() {
        let tree = branchy();
        let route = find_route(&tree, "b", "c").unwrap();
        assert_eq!(route.hops(), ["a", "c"]);
    }

    #[test]
    fn test_disjoint_trees_have_no_route() {
        let tree = ComponentTree::new();
        chain(&tree, &["a", "b"]);
        chain(&tree, &["x", "y"]);
        assert!(find_route(&tree, "b", "y").is_none());
    }

    #[test]
    fn test_unregistered_nodes_have_no_route() {
        let tree = ComponentTree::new();
        tree.attach("a", None).unwrap();
        assert!(find_route(&tree, "a", "ghost").is_none());
        assert!(find_route(&tree, "ghost", "a").is_none());
    }

    #[test]
    fn test_route_display_joins_with_colons() {
        let tree = branchy();
        let route = find_route(&tree, "d", "c").unwrap();
        assert_eq!(route.to_string(), "b:a:c");
    }
}

//! Component tree for Trellis.
//!
//! An arena of node records keyed by identity, each holding a parent
//! back-reference and an ordered list of child identities. This avoids the
//! cyclic-ownership problems of mutual parent/child object references while
//! keeping both traversal directions cheap.

use crate::envelope::{validate_node_id, NodeId};
use dashmap::DashMap;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// Default cap on registered nodes.
pub const DEFAULT_MAX_NODES: usize = 10_000;

/// Tree errors.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Invalid node identity.
    #[error("Invalid node identity: {0}")]
    InvalidIdentity(&'static str),

    /// Attachment would make a node its own ancestor.
    #[error("Attachment would make {0} its own ancestor")]
    CycleDetected(String),

    /// Maximum node count reached.
    #[error("Maximum node count reached")]
    MaxNodesReached,
}

/// A node record: parent back-reference plus ordered children.
#[derive(Debug, Clone, Default)]
pub struct TreeNode {
    /// Parent identity, `None` for roots.
    pub parent: Option<NodeId>,
    /// Child identities in attachment order.
    pub children: Vec<NodeId>,
}

/// Maintains parent/child relationships between registered node identities.
pub struct ComponentTree {
    /// Node records indexed by identity.
    nodes: DashMap<NodeId, TreeNode>,
    /// Cap on registered nodes.
    max_nodes: usize,
}

impl ComponentTree {
    /// Create a new tree with the default node cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_NODES)
    }

    /// Create a new tree with a custom node cap.
    #[must_use]
    pub fn with_limit(max_nodes: usize) -> Self {
        Self {
            nodes: DashMap::new(),
            max_nodes,
        }
    }

    /// Attach a node, optionally under a parent.
    ///
    /// An unknown parent identity attaches the node as a root. Re-attaching
    /// an existing node re-parents it: the node leaves its previous parent's
    /// children, is appended to the new parent's children (so a re-attach
    /// under the same parent moves it to the end), and keeps its own
    /// children. Detach-then-attach remains the supported re-parenting idiom.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is invalid, the attachment would make
    /// the node its own ancestor, or the node cap is reached.
    pub fn attach(&self, node_id: &str, parent_id: Option<&str>) -> Result<(), TreeError> {
        validate_node_id(node_id).map_err(TreeError::InvalidIdentity)?;

        let new_parent = match parent_id {
            Some(p) => {
                validate_node_id(p).map_err(TreeError::InvalidIdentity)?;
                if p == node_id {
                    return Err(TreeError::CycleDetected(node_id.to_string()));
                }
                if self.nodes.contains_key(p) {
                    if self.is_ancestor(node_id, p) {
                        return Err(TreeError::CycleDetected(node_id.to_string()));
                    }
                    Some(p.to_string())
                } else {
                    None
                }
            }
            None => None,
        };

        let existing = self.nodes.get(node_id).map(|n| n.value().clone());
        match existing {
            Some(prev) => {
                if let Some(ref old_parent) = prev.parent {
                    if let Some(mut p) = self.nodes.get_mut(old_parent) {
                        p.children.retain(|c| c != node_id);
                    }
                }
                self.nodes.insert(
                    node_id.to_string(),
                    TreeNode {
                        parent: new_parent.clone(),
                        children: prev.children,
                    },
                );
            }
            None => {
                if self.nodes.len() >= self.max_nodes {
                    return Err(TreeError::MaxNodesReached);
                }
                self.nodes.insert(
                    node_id.to_string(),
                    TreeNode {
                        parent: new_parent.clone(),
                        ..TreeNode::default()
                    },
                );
            }
        }

        if let Some(ref parent) = new_parent {
            if let Some(mut p) = self.nodes.get_mut(parent) {
                p.children.push(node_id.to_string());
            }
        }

        debug!(node = %node_id, parent = ?new_parent, "Node attached");
        Ok(())
    }

    /// Detach a node, returning its record.
    ///
    /// The node leaves its parent's children and its own children are
    /// promoted to roots; they stay addressable and become traversal roots
    /// of their own subtrees. No-op returning `None` if the node is absent.
    pub fn detach(&self, node_id: &str) -> Option<TreeNode> {
        let (_, node) = self.nodes.remove(node_id)?;

        if let Some(ref parent) = node.parent {
            if let Some(mut p) = self.nodes.get_mut(parent) {
                p.children.retain(|c| c != node_id);
            }
        }
        for child in &node.children {
            if let Some(mut c) = self.nodes.get_mut(child) {
                c.parent = None;
            }
        }

        debug!(node = %node_id, orphaned = node.children.len(), "Node detached");
        Some(node)
    }

    /// Check whether a node is registered.
    #[must_use]
    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Get a node's parent identity, `None` if the node is a root or absent.
    #[must_use]
    pub fn parent_of(&self, node_id: &str) -> Option<NodeId> {
        self.nodes.get(node_id).and_then(|n| n.parent.clone())
    }

    /// Get a node's children in attachment order, empty if absent.
    #[must_use]
    pub fn children_of(&self, node_id: &str) -> Vec<NodeId> {
        self.nodes
            .get(node_id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Find a root node.
    ///
    /// Only well-defined when exactly one root exists; with multiple roots
    /// the scan order is implementation-defined and the first match wins.
    #[must_use]
    pub fn find_root(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|entry| entry.value().parent.is_none())
            .map(|entry| entry.key().clone())
    }

    /// All root identities.
    #[must_use]
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|entry| entry.value().parent.is_none())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Ancestors of a node, nearest first, excluding the node itself.
    ///
    /// The walk carries a visited set so corrupted topology cannot hang it.
    #[must_use]
    pub fn ancestors_of(&self, node_id: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(node_id.to_string());

        let mut current = match self.parent_of(node_id) {
            Some(p) => p,
            None => return out,
        };
        loop {
            if !visited.insert(current.clone()) || !self.nodes.contains_key(&current) {
                break;
            }
            out.push(current.clone());
            match self.parent_of(&current) {
                Some(p) => current = p,
                None => break,
            }
        }
        out
    }

    /// The root of a node's own tree; the node itself when it is a root.
    ///
    /// `None` if the node is absent.
    #[must_use]
    pub fn root_of(&self, node_id: &str) -> Option<NodeId> {
        if !self.nodes.contains_key(node_id) {
            return None;
        }
        match self.ancestors_of(node_id).pop() {
            Some(root) => Some(root),
            None => Some(node_id.to_string()),
        }
    }

    /// Check whether `ancestor` appears in `node`'s ancestor chain.
    fn is_ancestor(&self, ancestor: &str, node: &str) -> bool {
        self.ancestors_of(node).iter().any(|a| a == ancestor)
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the tree is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Remove every node.
    pub fn clear(&self) {
        self.nodes.clear();
        debug!("Component tree cleared");
    }
}

impl Default for ComponentTree {
    fn default() -> Self {
        Self::new()
    }
}

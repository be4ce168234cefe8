//! The Trellis router.
//!
//! The router ties the handler registry, the component tree, and the route
//! finder into the public send/broadcast surface. Every directed operation
//! builds an envelope, stamps `from`/`direction`/`route`, and funnels through
//! the registry's addressed-delivery primitive.
//!
//! Delivery misses (no handler at an address) are never errors; they show up
//! only in the boolean/count return values. The only fail-fast condition is
//! malformed input: empty identities and empty command keys.

use crate::envelope::{validate_node_id, Direction, Envelope, NodeId};
use crate::registry::{
    HandlerRegistry, RegistrationToken, RegistryError, DEFAULT_MAX_HANDLERS_PER_COMMAND,
};
use crate::route::Route;
use crate::tree::{ComponentTree, TreeError, DEFAULT_MAX_NODES};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Handler registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Tree mutation failed.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Malformed identity on a send operation.
    #[error("Invalid node identity: {0}")]
    InvalidIdentity(&'static str),
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum number of registered tree nodes.
    pub max_nodes: usize,
    /// Maximum handlers per command key.
    pub max_handlers_per_command: usize,
    /// Whether detaching a node also removes its addressed handler.
    ///
    /// Off by default: handler lifetime is decoupled from tree-node lifetime
    /// and callers unregister explicitly.
    pub release_handlers_on_detach: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_handlers_per_command: DEFAULT_MAX_HANDLERS_PER_COMMAND,
            release_handlers_on_detach: false,
        }
    }
}

/// Router statistics.
#[derive(Debug, Clone)]
pub struct RouterStats {
    /// Number of registered tree nodes.
    pub node_count: usize,
    /// Number of root nodes.
    pub root_count: usize,
    /// Number of command-keyed handlers across all keys.
    pub command_handler_count: usize,
    /// Number of global handlers.
    pub global_handler_count: usize,
    /// Number of addressed handlers.
    pub addressed_handler_count: usize,
}

/// The tree-addressed message router.
///
/// Construction is explicit; there is no shared global instance. Construct
/// once at application start and hand a reference to every collaborator.
pub struct Router {
    registry: HandlerRegistry,
    tree: ComponentTree,
    config: RouterConfig,
}

impl Router {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            registry: HandlerRegistry::with_limit(config.max_handlers_per_command),
            tree: ComponentTree::with_limit(config.max_nodes),
            config,
        }
    }

    fn ensure_id(id: &str) -> Result<(), RouterError> {
        validate_node_id(id).map_err(RouterError::InvalidIdentity)
    }

    // --- Registration ---

    /// Register a handler for a command key.
    ///
    /// # Errors
    ///
    /// Returns an error on an empty key or when the per-command cap is hit.
    pub fn register_handler<F>(
        &self,
        command: &str,
        callback: F,
    ) -> Result<RegistrationToken, RouterError>
    where
        F: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        Ok(self.registry.register_command(command, callback)?)
    }

    /// Register a global handler, invoked for every dispatched command.
    pub fn register_global_handler<F>(&self, callback: F) -> RegistrationToken
    where
        F: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        self.registry.register_global(callback)
    }

    /// Register the addressed handler for a node identity, replacing any
    /// existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is invalid.
    pub fn register_addressed_handler<F>(
        &self,
        node_id: &str,
        callback: F,
    ) -> Result<RegistrationToken, RouterError>
    where
        F: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        Ok(self.registry.register_addressed(node_id, callback)?)
    }

    /// Remove the registration a token was issued for.
    pub fn unregister(&self, token: RegistrationToken) -> bool {
        self.registry.unregister(token)
    }

    // --- Tree ---

    /// Attach a node into the tree, optionally under a parent.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid identity, a cycle, or the node cap.
    pub fn attach(&self, node_id: &str, parent_id: Option<&str>) -> Result<(), RouterError> {
        Ok(self.tree.attach(node_id, parent_id)?)
    }

    /// Detach a node from the tree.
    ///
    /// Its children are promoted to roots. With
    /// [`RouterConfig::release_handlers_on_detach`] set, the node's addressed
    /// handler is removed as well; otherwise handlers outlive the node.
    /// Returns `true` if the node was attached. Unknown identities are a
    /// no-op.
    pub fn detach(&self, node_id: &str) -> bool {
        let detached = self.tree.detach(node_id).is_some();
        if detached && self.config.release_handlers_on_detach {
            self.registry.release_address(node_id);
        }
        detached
    }

    /// Check whether a node is attached.
    #[must_use]
    pub fn is_attached(&self, node_id: &str) -> bool {
        self.tree.contains(node_id)
    }

    /// A node's parent identity, `None` for roots and unknown identities.
    #[must_use]
    pub fn parent_of(&self, node_id: &str) -> Option<NodeId> {
        self.tree.parent_of(node_id)
    }

    /// A node's children in attachment order.
    #[must_use]
    pub fn children_of(&self, node_id: &str) -> Vec<NodeId> {
        self.tree.children_of(node_id)
    }

    /// Find a root node; only well-defined with exactly one root.
    #[must_use]
    pub fn find_root(&self) -> Option<NodeId> {
        self.tree.find_root()
    }

    // --- Sending ---

    /// Dispatch a command to the global and command-keyed handlers.
    ///
    /// Returns whether a keyed handler handled the command.
    ///
    /// # Errors
    ///
    /// Returns an error on an empty command key or sender identity.
    pub fn dispatch(&self, command: &str, payload: Value, sender: &str) -> Result<bool, RouterError> {
        if command.is_empty() {
            return Err(RegistryError::InvalidCommand("Command key cannot be empty").into());
        }
        Self::ensure_id(sender)?;

        let envelope = Envelope::new(command, payload, sender);
        trace!(command = %command, sender = %sender, "Dispatching command");
        Ok(self.registry.dispatch_command(&envelope))
    }

    /// Send directly to a target's addressed handler.
    ///
    /// Returns whether the target had a handler.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed identity.
    pub fn send_direct(
        &self,
        target: &str,
        kind: &str,
        payload: Value,
        sender: &str,
    ) -> Result<bool, RouterError> {
        Self::ensure_id(target)?;
        Self::ensure_id(sender)?;

        let envelope = Envelope::new(kind, payload, sender).with_direction(Direction::Direct);
        Ok(self.registry.dispatch_to_address(target, &envelope))
    }

    /// Bubble toward the root: deliver to each successive ancestor, halting
    /// at the first ancestor without an addressed handler.
    ///
    /// Returns whether anything was delivered.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed identity.
    pub fn send_toward_root(
        &self,
        from: &str,
        kind: &str,
        payload: Value,
    ) -> Result<bool, RouterError> {
        Self::ensure_id(from)?;

        let envelope = Envelope::new(kind, payload, from).with_direction(Direction::Down);
        let mut delivered_any = false;
        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(from.to_string());

        let mut current = from.to_string();
        while let Some(parent) = self.tree.parent_of(&current) {
            if !visited.insert(parent.clone()) {
                break;
            }
            if !self.registry.dispatch_to_address(&parent, &envelope) {
                trace!(node = %parent, "Bubbling halted at silent ancestor");
                break;
            }
            delivered_any = true;
            current = parent;
        }
        Ok(delivered_any)
    }

    /// Deliver independently to each target (route-collapsed addressing).
    ///
    /// Returns `true` if at least one delivery succeeded; per-target misses
    /// are silent.
    ///
    /// # Errors
    ///
    /// Returns an error if any identity is malformed.
    pub fn send_toward_leaves<'a>(
        &self,
        from: &str,
        targets: impl IntoIterator<Item = &'a str>,
        kind: &str,
        payload: Value,
    ) -> Result<bool, RouterError> {
        Self::ensure_id(from)?;
        let targets: Vec<&str> = targets.into_iter().collect();
        for target in &targets {
            Self::ensure_id(target)?;
        }

        let envelope = Envelope::new(kind, payload, from).with_direction(Direction::Up);
        let mut delivered_any = false;
        for target in targets {
            delivered_any |= self.registry.dispatch_to_address(target, &envelope);
        }
        Ok(delivered_any)
    }

    /// Broadcast into the sender's subtree, pruning at silent children.
    ///
    /// Pre-order worklist traversal: each child is delivered to, and only
    /// children that accepted (had an addressed handler) have their own
    /// subtrees visited. A silent child prunes its entire subtree.
    ///
    /// Returns the delivered count.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed identity.
    pub fn broadcast_to_children(
        &self,
        from: &str,
        kind: &str,
        payload: Value,
    ) -> Result<usize, RouterError> {
        Self::ensure_id(from)?;

        let envelope = Envelope::new(kind, payload, from).with_direction(Direction::Up);
        let mut delivered = 0;
        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(from.to_string());

        let mut stack: Vec<NodeId> = self.tree.children_of(from);
        stack.reverse();
        while let Some(node) = stack.pop() {
            if !visited.insert(node.clone()) {
                continue;
            }
            if !self.registry.dispatch_to_address(&node, &envelope) {
                trace!(node = %node, "Subtree pruned at silent child");
                continue;
            }
            delivered += 1;
            for child in self.tree.children_of(&node).into_iter().rev() {
                stack.push(child);
            }
        }
        Ok(delivered)
    }

    /// Deliver to every ancestor up to the root, regardless of misses.
    ///
    /// Unlike [`Router::send_toward_root`], a silent ancestor does not halt
    /// the walk.
    ///
    /// Returns the delivered count.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed identity.
    pub fn broadcast_to_ancestors(
        &self,
        from: &str,
        kind: &str,
        payload: Value,
    ) -> Result<usize, RouterError> {
        Self::ensure_id(from)?;

        let envelope = Envelope::new(kind, payload, from).with_direction(Direction::Down);
        let mut delivered = 0;
        for ancestor in self.tree.ancestors_of(from) {
            if self.registry.dispatch_to_address(&ancestor, &envelope) {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Deliver to every node of the sender's tree except the sender itself.
    ///
    /// Resolves the root of the sender's own tree (falling back to
    /// [`Router::find_root`] when the sender is not attached), then visits
    /// every node pre-order, children in attachment order, with no pruning.
    ///
    /// Returns the delivered count.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed identity.
    pub fn broadcast_tree(
        &self,
        from: &str,
        kind: &str,
        payload: Value,
    ) -> Result<usize, RouterError> {
        Self::ensure_id(from)?;

        let root = match self.tree.root_of(from).or_else(|| self.tree.find_root()) {
            Some(root) => root,
            None => return Ok(0),
        };

        let envelope = Envelope::new(kind, payload, from).with_direction(Direction::Up);
        let mut delivered = 0;
        let mut visited: HashSet<NodeId> = HashSet::new();

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !visited.insert(node.clone()) {
                continue;
            }
            for child in self.tree.children_of(&node).into_iter().rev() {
                stack.push(child);
            }
            if node == from {
                continue;
            }
            if self.registry.dispatch_to_address(&node, &envelope) {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Deliver to every addressed handler except the sender, regardless of
    /// tree position, in registration order.
    ///
    /// Returns the delivered count.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed identity.
    pub fn broadcast_addressed(
        &self,
        from: &str,
        kind: &str,
        payload: Value,
    ) -> Result<usize, RouterError> {
        Self::ensure_id(from)?;

        let envelope = Envelope::new(kind, payload, from);
        Ok(self.registry.dispatch_to_all_addressed(&envelope, &[from]))
    }

    /// Deliver along a precomputed route.
    ///
    /// Only the final hop is dispatched to. Multi-hop routes are stamped with
    /// the route and direction `route`; single-hop routes are `direct`. An
    /// empty route delivers nothing.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed identity.
    pub fn send_via_route(
        &self,
        from: &str,
        route: &Route,
        kind: &str,
        payload: Value,
    ) -> Result<bool, RouterError> {
        Self::ensure_id(from)?;

        let target = match route.last_hop() {
            Some(target) => target.to_string(),
            None => return Ok(false),
        };
        let direction = if route.len() > 1 {
            Direction::Route
        } else {
            Direction::Direct
        };
        let envelope = Envelope::new(kind, payload, from)
            .with_direction(direction)
            .with_route(route.hops().to_vec());
        Ok(self.registry.dispatch_to_address(&target, &envelope))
    }

    /// Compute a route between two nodes, for callers that want to
    /// precompute and cache.
    #[must_use]
    pub fn find_route(&self, source: &str, target: &str) -> Option<Route> {
        crate::route::find_route(&self.tree, source, target)
    }

    // --- Administration ---

    /// Reset every store; the router is indistinguishable from a freshly
    /// constructed one. Idempotent.
    pub fn clear(&self) {
        self.tree.clear();
        self.registry.clear();
        debug!("Router cleared");
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            node_count: self.tree.len(),
            root_count: self.tree.roots().len(),
            command_handler_count: self.registry.command_handler_count(),
            global_handler_count: self.registry.global_handler_count(),
            addressed_handler_count: self.registry.addressed_handler_count(),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

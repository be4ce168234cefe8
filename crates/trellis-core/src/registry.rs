//! Handler registry for Trellis.
//!
//! The registry stores three separate handler stores: command-keyed handler
//! sequences, a single global (catch-all) sequence, and one addressed handler
//! per node identity. Addressed handlers are the delivery endpoint for every
//! directed send; command-keyed and global handlers serve command dispatch.
//!
//! Every registration returns a one-shot [`RegistrationToken`]; passing it
//! back to [`HandlerRegistry::unregister`] removes exactly the entry it was
//! issued for.

use crate::envelope::{validate_node_id, Envelope, NodeId};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Default cap on handlers registered for a single command key.
pub const DEFAULT_MAX_HANDLERS_PER_COMMAND: usize = 100;

/// A handler callback.
///
/// Returns `true` when the message is considered handled, which stops
/// further propagation in bubbling contexts.
pub type HandlerFn = Arc<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Invalid node identity.
    #[error("Invalid node identity: {0}")]
    InvalidIdentity(&'static str),

    /// Invalid command key.
    #[error("Invalid command key: {0}")]
    InvalidCommand(&'static str),

    /// Maximum handlers reached for a command key.
    #[error("Maximum handlers reached for command: {0}")]
    MaxHandlersReached(String),
}

/// Which store a token belongs to.
#[derive(Debug)]
enum TokenSlot {
    Command(String),
    Global,
    Addressed(NodeId),
}

/// Opaque one-shot handle identifying a single registration.
///
/// Consuming the token through [`HandlerRegistry::unregister`] removes
/// exactly the entry it was issued for; a token issued for a handler that
/// has since been replaced is a no-op.
#[derive(Debug)]
pub struct RegistrationToken {
    slot: TokenSlot,
    seq: u64,
}

/// A registered handler with its registration sequence number.
struct HandlerEntry {
    seq: u64,
    callback: HandlerFn,
}

/// Stores command-keyed, global, and addressed handlers.
///
/// Registration order is tracked with a monotonic sequence number so that
/// iteration over the unordered stores stays deterministic.
pub struct HandlerRegistry {
    /// Command-keyed handler sequences, invocation order = registration order.
    commands: DashMap<String, Vec<HandlerEntry>>,
    /// Global catch-all sequence, invoked for every dispatched command.
    globals: RwLock<Vec<HandlerEntry>>,
    /// Addressed handlers, one per node identity.
    addressed: DashMap<NodeId, HandlerEntry>,
    /// Registration sequence counter.
    next_seq: AtomicU64,
    /// Cap per command key.
    max_handlers_per_command: usize,
}

impl HandlerRegistry {
    /// Create a new registry with the default per-command handler cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_HANDLERS_PER_COMMAND)
    }

    /// Create a new registry with a custom per-command handler cap.
    #[must_use]
    pub fn with_limit(max_handlers_per_command: usize) -> Self {
        Self {
            commands: DashMap::new(),
            globals: RwLock::new(Vec::new()),
            addressed: DashMap::new(),
            next_seq: AtomicU64::new(0),
            max_handlers_per_command,
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a handler for a command key.
    ///
    /// Handlers for the same key are invoked in registration order until one
    /// returns `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the per-command cap is reached.
    pub fn register_command<F>(
        &self,
        command: &str,
        callback: F,
    ) -> Result<RegistrationToken, RegistryError>
    where
        F: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        if command.is_empty() {
            return Err(RegistryError::InvalidCommand("Command key cannot be empty"));
        }

        let seq = self.next_seq();
        {
            let mut entry = self.commands.entry(command.to_string()).or_default();
            if entry.len() >= self.max_handlers_per_command {
                return Err(RegistryError::MaxHandlersReached(command.to_string()));
            }
            entry.push(HandlerEntry {
                seq,
                callback: Arc::new(callback),
            });
        }

        debug!(command = %command, seq, "Command handler registered");

        Ok(RegistrationToken {
            slot: TokenSlot::Command(command.to_string()),
            seq,
        })
    }

    /// Register a global handler, invoked for every dispatched command.
    pub fn register_global<F>(&self, callback: F) -> RegistrationToken
    where
        F: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        let seq = self.next_seq();
        self.globals.write().push(HandlerEntry {
            seq,
            callback: Arc::new(callback),
        });

        debug!(seq, "Global handler registered");

        RegistrationToken {
            slot: TokenSlot::Global,
            seq,
        }
    }

    /// Register the addressed handler for a node identity.
    ///
    /// Replaces any existing addressed handler for that identity; the prior
    /// handler receives no further deliveries and its token becomes inert.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is invalid.
    pub fn register_addressed<F>(
        &self,
        node_id: &str,
        callback: F,
    ) -> Result<RegistrationToken, RegistryError>
    where
        F: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        validate_node_id(node_id).map_err(RegistryError::InvalidIdentity)?;

        let seq = self.next_seq();
        let replaced = self
            .addressed
            .insert(
                node_id.to_string(),
                HandlerEntry {
                    seq,
                    callback: Arc::new(callback),
                },
            )
            .is_some();

        debug!(node = %node_id, seq, replaced, "Addressed handler registered");

        Ok(RegistrationToken {
            slot: TokenSlot::Addressed(node_id.to_string()),
            seq,
        })
    }

    /// Remove the registration a token was issued for.
    ///
    /// Returns `true` if an entry was removed. Removing the last handler for
    /// a command key drops the key entry.
    pub fn unregister(&self, token: RegistrationToken) -> bool {
        match token.slot {
            TokenSlot::Command(key) => {
                let mut removed = false;
                let mut now_empty = false;
                if let Some(mut entry) = self.commands.get_mut(&key) {
                    let before = entry.len();
                    entry.retain(|h| h.seq != token.seq);
                    removed = entry.len() != before;
                    now_empty = entry.is_empty();
                }
                if now_empty {
                    self.commands.remove_if(&key, |_, v| v.is_empty());
                }
                if removed {
                    debug!(command = %key, seq = token.seq, "Command handler unregistered");
                }
                removed
            }
            TokenSlot::Global => {
                let mut globals = self.globals.write();
                let before = globals.len();
                globals.retain(|h| h.seq != token.seq);
                let removed = globals.len() != before;
                if removed {
                    debug!(seq = token.seq, "Global handler unregistered");
                }
                removed
            }
            TokenSlot::Addressed(node) => {
                // Only remove if the entry is still the one this token was
                // issued for; a replacement must survive the stale token.
                let removed = self
                    .addressed
                    .remove_if(&node, |_, entry| entry.seq == token.seq)
                    .is_some();
                if removed {
                    debug!(node = %node, seq = token.seq, "Addressed handler unregistered");
                }
                removed
            }
        }
    }

    /// Remove the addressed handler for a node identity, if any.
    ///
    /// Returns `true` if a handler was removed.
    pub fn release_address(&self, node_id: &str) -> bool {
        let removed = self.addressed.remove(node_id).is_some();
        if removed {
            debug!(node = %node_id, "Addressed handler released");
        }
        removed
    }

    /// Deliver an envelope to the addressed handler for a node identity.
    ///
    /// This is the sole low-level delivery primitive; every directed send
    /// funnels through it. Returns `true` if a handler was present and
    /// invoked. The handler's own boolean return does not affect the result.
    pub fn dispatch_to_address(&self, node_id: &str, envelope: &Envelope) -> bool {
        let callback = match self.addressed.get(node_id) {
            Some(entry) => entry.callback.clone(),
            None => return false,
        };

        trace!(node = %node_id, kind = %envelope.kind, "Delivering to address");
        let handled = (*callback)(envelope);
        trace!(node = %node_id, handled, "Addressed delivery complete");
        true
    }

    /// Deliver an envelope to every addressed handler except the excluded
    /// identities, in registration order.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch_to_all_addressed(&self, envelope: &Envelope, exclude: &[&str]) -> usize {
        let mut targets: Vec<(u64, NodeId, HandlerFn)> = self
            .addressed
            .iter()
            .filter(|entry| !exclude.contains(&entry.key().as_str()))
            .map(|entry| {
                (
                    entry.value().seq,
                    entry.key().clone(),
                    entry.value().callback.clone(),
                )
            })
            .collect();
        targets.sort_by_key(|(seq, _, _)| *seq);

        let mut delivered = 0;
        for (_, node, callback) in targets {
            trace!(node = %node, kind = %envelope.kind, "Delivering to address");
            (*callback)(envelope);
            delivered += 1;
        }
        delivered
    }

    /// Dispatch a command envelope to the global and command-keyed handlers.
    ///
    /// Global handlers run first, in registration order, as observers; their
    /// returns are ignored. Command-keyed handlers for `envelope.kind` then
    /// run in registration order until one returns `true`.
    ///
    /// Returns whether a keyed handler handled the command.
    pub fn dispatch_command(&self, envelope: &Envelope) -> bool {
        let globals: Vec<HandlerFn> = self
            .globals
            .read()
            .iter()
            .map(|h| h.callback.clone())
            .collect();
        for callback in globals {
            (*callback)(envelope);
        }

        let keyed: Vec<HandlerFn> = self
            .commands
            .get(envelope.kind.as_str())
            .map(|entry| entry.iter().map(|h| h.callback.clone()).collect())
            .unwrap_or_default();

        for callback in keyed {
            if (*callback)(envelope) {
                trace!(command = %envelope.kind, "Command handled");
                return true;
            }
        }
        false
    }

    /// Check whether a node identity has an addressed handler.
    #[must_use]
    pub fn has_address(&self, node_id: &str) -> bool {
        self.addressed.contains_key(node_id)
    }

    /// Check whether any handler is registered for a command key.
    #[must_use]
    pub fn has_command(&self, command: &str) -> bool {
        self.commands.contains_key(command)
    }

    /// Total number of command-keyed handlers across all keys.
    #[must_use]
    pub fn command_handler_count(&self) -> usize {
        self.commands.iter().map(|entry| entry.len()).sum()
    }

    /// Number of global handlers.
    #[must_use]
    pub fn global_handler_count(&self) -> usize {
        self.globals.read().len()
    }

    /// Number of addressed handlers.
    #[must_use]
    pub fn addressed_handler_count(&self) -> usize {
        self.addressed.len()
    }

    /// Remove every registration.
    pub fn clear(&self) {
        self.commands.clear();
        self.globals.write().clear();
        self.addressed.clear();
        debug!("Handler registry cleared");
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

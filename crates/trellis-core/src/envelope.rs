//! Message envelopes for Trellis.
//!
//! An envelope is the unit of delivery: an opaque payload plus the routing
//! metadata the dispatcher stamps before handing it to a handler.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum node identity length.
pub const MAX_NODE_ID_LENGTH: usize = 256;

/// A node identity.
///
/// Opaque and caller-assigned; uniqueness is the caller's responsibility.
pub type NodeId = String;

/// Validate a node identity.
///
/// # Errors
///
/// Returns an error message if the identity is invalid.
pub fn validate_node_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("Node identity cannot be empty");
    }
    if id.len() > MAX_NODE_ID_LENGTH {
        return Err("Node identity too long");
    }
    // Check for valid ASCII printable characters
    if !id.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Node identity contains invalid characters");
    }
    Ok(())
}

/// A unique envelope identifier.
pub type EnvelopeId = u64;

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique envelope ID.
#[must_use]
pub fn generate_envelope_id() -> EnvelopeId {
    // Combine timestamp with atomic counter for guaranteed uniqueness
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    timestamp.wrapping_add(counter)
}

/// Delivery direction stamped on an envelope by the dispatcher.
///
/// `Up` is toward the leaves, `Down` is toward the root (bubbling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward the leaves.
    Up,
    /// Toward the root.
    Down,
    /// Along a precomputed multi-hop route.
    Route,
    /// Point-to-point, no traversal.
    Direct,
}

/// A message envelope.
///
/// Immutable once dispatched except for the `from`/`direction`/`route`
/// fields the dispatcher stamps before delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique envelope identifier.
    pub id: EnvelopeId,
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque structured payload.
    pub payload: serde_json::Value,
    /// Identity of the sending node.
    pub from: NodeId,
    /// Delivery direction, if this is a tree-oriented send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Precomputed route, stamped only on routed sends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Vec<NodeId>>,
    /// Timestamp when the envelope was created.
    pub timestamp: u64,
}

impl Envelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        payload: serde_json::Value,
        from: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: generate_envelope_id(),
            kind: kind.into(),
            payload,
            from: from.into(),
            direction: None,
            route: None,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_millis() as u64,
        }
    }

    /// Stamp a delivery direction.
    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Stamp a precomputed route.
    #[must_use]
    pub fn with_route(mut self, route: Vec<NodeId>) -> Self {
        self.route = Some(route);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_creation() {
        let env = Envelope::new("playlist:changed", json!({"items": 3}), "editor");
        assert_eq!(env.kind, "playlist:changed");
        assert_eq!(env.from, "editor");
        assert!(env.direction.is_none());
        assert!(env.route.is_none());
    }

    #[test]
    fn test_envelope_stamping() {
        let env = Envelope::new("focus", json!(null), "bar")
            .with_direction(Direction::Route)
            .with_route(vec!["a".to_string(), "b".to_string()]);

        assert_eq!(env.direction, Some(Direction::Route));
        assert_eq!(env.route.as_deref().unwrap().len(), 2);
    }

    #[test]
    fn test_node_id_validation() {
        assert!(validate_node_id("side-window:left").is_ok());
        assert!(validate_node_id("").is_err());
        assert!(validate_node_id("bad\nid").is_err());

        let long_id = "a".repeat(MAX_NODE_ID_LENGTH + 1);
        assert!(validate_node_id(&long_id).is_err());
    }

    #[test]
    fn test_unique_envelope_ids() {
        let id1 = generate_envelope_id();
        let id2 = generate_envelope_id();
        // IDs should be different (with high probability)
        assert_ne!(id1, id2);
    }
}

//! # trellis-core
//!
//! Tree-addressed, bidirectional message routing for component hierarchies.
//!
//! Components attach into a caller-defined tree and exchange opaque envelopes
//! in either direction: toward the leaves, toward the root (bubbling, like
//! DOM event propagation generalized to an arbitrary application tree),
//! across the whole tree, or point-to-point via computed routes.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Envelope** - The unit of delivery: payload plus routing metadata
//! - **HandlerRegistry** - Command-keyed, global, and addressed handlers
//! - **ComponentTree** - Parent/child relationships between node identities
//! - **Route** - Path computation between any two nodes
//! - **Router** - The public send and broadcast surface
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────┐
//! │  Component  │────▶│   Router    │────▶│ Handler Registry │
//! └─────────────┘     └─────────────┘     └──────────────────┘
//!                        │       │
//!                        ▼       ▼
//!               ┌──────────────┐ ┌──────────────┐
//!               │Component Tree│ │ Route Finder │
//!               └──────────────┘ └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use trellis_core::Router;
//!
//! let router = Router::new();
//! router.attach("window", None).unwrap();
//! router.attach("editor", Some("window")).unwrap();
//!
//! let _token = router
//!     .register_addressed_handler("window", |envelope| {
//!         println!("{} from {}", envelope.kind, envelope.from);
//!         true
//!     })
//!     .unwrap();
//!
//! // Bubble from the editor toward the root.
//! let delivered = router
//!     .send_toward_root("editor", "title:changed", json!({"title": "untitled"}))
//!     .unwrap();
//! assert!(delivered);
//! ```

pub mod envelope;
pub mod registry;
pub mod route;
pub mod router;
pub mod tree;

pub use envelope::{Direction, Envelope, EnvelopeId, NodeId};
pub use registry::{HandlerFn, HandlerRegistry, RegistrationToken, RegistryError};
pub use route::{find_route, Route};
pub use router::{Router, RouterConfig, RouterError, RouterStats};
pub use tree::{ComponentTree, TreeError, TreeNode};

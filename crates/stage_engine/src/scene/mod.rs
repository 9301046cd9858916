//! Scene graph and per-frame dirty flushing
//!
//! Nodes own their transforms and drive their render representation
//! through stage handles. Mutations only mark nodes dirty; the
//! [`Scene::flush`] pass recomputes world matrices and mounts, moves or
//! rebuilds render representations exactly once per frame phase.

pub mod graph;
pub mod node;
pub mod prim;
pub mod scheduler;

pub use graph::{FlushReport, Scene, SceneContext};
pub use node::{MeshNode, MeshSource, NodeKind, SceneNode};
pub use prim::{PrimChange, PrimNode, PrimPhysics};
pub use scheduler::{Commit, DirtyScheduler};

use crate::render::MaterialError;

slotmap::new_key_type! {
    /// Identity of a scene node
    pub struct NodeId;
}

/// Identity of the networked entity a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Identifies one async mount attempt
///
/// A completion carrying a ticket whose generation no longer matches the
/// node's is stale and is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MountTicket {
    /// Node that started the mount
    pub node: NodeId,
    /// Node generation when the mount started
    pub generation: u64,
}

/// Scene node errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeError {
    /// A property write was rejected before any state changed
    #[error("[{node}] {property}: {reason}")]
    Invalid {
        /// Node type name
        node: &'static str,
        /// Offending property
        property: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// The node id is not in this scene
    #[error("unknown node")]
    UnknownNode,

    /// The operation needs a different node kind
    #[error("node is not a {0}")]
    WrongKind(&'static str),

    /// Reparenting would create a cycle
    #[error("cannot parent a node under itself or its descendants")]
    Cycle,

    /// Material proxy rejected a write
    #[error(transparent)]
    Material(#[from] MaterialError),
}

//! Insertion options

use std::rc::Rc;

use crate::foundation::math::Mat4;
use crate::render::{Color, Emissive, Geometry, MaterialRef};
use crate::scene::{EntityId, NodeId};
use crate::spatial::Layers;

/// Options for inserting a mesh
#[derive(Debug, Clone)]
pub struct MeshOptions {
    /// Geometry to draw
    pub geometry: Rc<Geometry>,
    /// Source material; the stage renders a private copy
    pub material: MaterialRef,
    /// Share an instanced draw with every mesh of the same signature
    pub linked: bool,
    /// Writes into shadow maps
    pub cast_shadow: bool,
    /// Samples shadow maps
    pub receive_shadow: bool,
    /// Owning node
    pub node: NodeId,
    /// Entity the node belongs to
    pub entity: Option<EntityId>,
    /// Raycast layers
    pub layers: Layers,
    /// Initial world transform
    pub matrix: Mat4,
}

/// Options for inserting a primitive with per-instance appearance
#[derive(Debug, Clone)]
pub struct PrimitiveOptions {
    /// Shared unit geometry
    pub geometry: Rc<Geometry>,
    /// Source material, `None` for the default primitive material
    pub material: Option<MaterialRef>,
    /// Writes into shadow maps
    pub cast_shadow: bool,
    /// Samples shadow maps
    pub receive_shadow: bool,
    /// Owning node
    pub node: NodeId,
    /// Entity the node belongs to
    pub entity: Option<EntityId>,
    /// Raycast layers
    pub layers: Layers,
    /// Initial world transform
    pub matrix: Mat4,
    /// Per-instance colour
    pub color: Option<Color>,
    /// Per-instance emission
    pub emissive: Option<Emissive>,
}

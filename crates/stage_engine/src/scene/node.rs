//! Scene nodes

use std::rc::Rc;

use crate::foundation::math::{Mat4, Transform};
use crate::physics::ActorHandle;
use crate::render::{Geometry, MaterialRef};
use crate::spatial::Layers;
use crate::stage::InstanceHandle;

use super::prim::PrimNode;
use super::{EntityId, MountTicket, NodeId};

/// Where a mesh node's geometry comes from
#[derive(Debug, Clone)]
pub enum MeshSource {
    /// Already resolved
    Geometry(Rc<Geometry>),
    /// Loaded through the asset loader on mount
    Url(String),
}

/// A mesh with an explicit material
#[derive(Debug, Clone)]
pub struct MeshNode {
    /// Geometry source
    pub source: MeshSource,
    /// Source material; the stage renders a private copy
    pub material: MaterialRef,
    /// Batch with meshes of the same signature
    pub linked: bool,
    /// Writes into shadow maps
    pub cast_shadow: bool,
    /// Samples shadow maps
    pub receive_shadow: bool,
}

impl MeshNode {
    /// Linked mesh casting and receiving shadows
    pub fn new(source: MeshSource, material: MaterialRef) -> Self {
        Self {
            source,
            material,
            linked: true,
            cast_shadow: true,
            receive_shadow: true,
        }
    }
}

/// What a node renders as
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Transform-only node
    Group,
    /// Mesh node
    Mesh(MeshNode),
    /// Primitive node
    Prim(PrimNode),
}

/// A node in the scene graph
///
/// The world matrix is only current after a flush. `dirty` means the node
/// is queued for the next flush; `transformed` means its local transform
/// changed; `needs_rebuild` means its render representation must be
/// remounted rather than moved; `reshaped` means its collider no longer
/// matches the prim size.
#[derive(Debug)]
pub struct SceneNode {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) transform: Transform,
    pub(crate) world: Mat4,
    pub(crate) visible: bool,
    pub(crate) active: bool,
    pub(crate) layers: Layers,
    pub(crate) entity: Option<EntityId>,
    pub(crate) kind: NodeKind,
    pub(crate) dirty: bool,
    pub(crate) transformed: bool,
    pub(crate) needs_rebuild: bool,
    pub(crate) reshaped: bool,
    pub(crate) generation: u64,
    pub(crate) pending: Option<MountTicket>,
    pub(crate) render: Option<InstanceHandle>,
    pub(crate) actor: Option<Box<dyn ActorHandle>>,
}

impl SceneNode {
    /// Node of the given kind at the origin
    pub fn new(kind: NodeKind) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            transform: Transform::identity(),
            world: Mat4::identity(),
            visible: true,
            active: false,
            layers: Layers::DEFAULT,
            entity: None,
            kind,
            dirty: false,
            transformed: true,
            needs_rebuild: true,
            reshaped: false,
            generation: 0,
            pending: None,
            render: None,
            actor: None,
        }
    }

    /// Transform-only node
    pub fn group() -> Self {
        Self::new(NodeKind::Group)
    }

    /// Builder: local transform
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Builder: raycast layers
    pub fn with_layers(mut self, layers: Layers) -> Self {
        self.layers = layers;
        self
    }

    /// Builder: owning entity
    pub fn with_entity(mut self, entity: EntityId) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Builder: initial visibility
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Parent node
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Local transform
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// World matrix as of the last flush
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world
    }

    /// Matrix the render representation is drawn with
    pub fn render_matrix(&self) -> Mat4 {
        match &self.kind {
            NodeKind::Prim(prim) => self.world * Mat4::new_nonuniform_scaling(&prim.render_scale()),
            NodeKind::Group | NodeKind::Mesh(_) => self.world,
        }
    }

    /// Own visibility flag
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Visible along the whole ancestor chain, as of the last flush
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Raycast layers
    pub fn layers(&self) -> Layers {
        self.layers
    }

    /// Owning entity
    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    /// Node kind
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Prim state, for prim nodes
    pub fn prim(&self) -> Option<&PrimNode> {
        match &self.kind {
            NodeKind::Prim(prim) => Some(prim),
            NodeKind::Group | NodeKind::Mesh(_) => None,
        }
    }

    /// Queued for the next flush
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Remount pending
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Mount generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Async mount in flight
    pub fn pending_mount(&self) -> Option<MountTicket> {
        self.pending
    }

    /// Stage handle of the mounted render representation
    pub fn handle(&self) -> Option<&InstanceHandle> {
        self.render.as_ref()
    }

    /// Whether a render representation is mounted
    pub fn is_mounted(&self) -> bool {
        self.render.is_some()
    }

    /// Whether a physics actor is attached
    pub fn has_actor(&self) -> bool {
        self.actor.is_some()
    }
}

//! Spatial indexing for hit-testing
//!
//! Every mounted render item has one entry in a [`SpatialIndex`]. The stage
//! keeps entries in sync with batch slots: inserted on mount, refit on move,
//! removed on unmount.

pub mod bounds;
pub mod layers;
pub mod octree;

pub use bounds::{Aabb, BoundingSphere, Ray, Triangle};
pub use layers::Layers;
pub use octree::LooseOctree;

use std::rc::Rc;

use crate::foundation::math::{Mat4, Vec3};
use crate::render::geometry::Geometry;
use crate::scene::{EntityId, NodeId};

slotmap::new_key_type! {
    /// Identity of one entry in a spatial index
    pub struct SpatialKey;
}

/// What the spatial index knows about a mounted render item
#[derive(Debug, Clone)]
pub struct RenderItem {
    /// World matrix of the owning node
    pub matrix: Mat4,
    /// Shared geometry used for the precise hit test
    pub geometry: Rc<Geometry>,
    /// Owning scene node
    pub node: NodeId,
    /// Entity the node belongs to, if any
    pub entity: Option<EntityId>,
    /// Layers the item is visible to raycasts on
    pub layers: Layers,
}

/// Parameters of a ray query
#[derive(Debug, Clone, Copy)]
pub struct RaycastQuery {
    /// World-space ray
    pub ray: Ray,
    /// Only items sharing a layer with this mask are tested
    pub layers: Layers,
    /// Hits closer than this are discarded
    pub near: f32,
    /// Hits farther than this are discarded
    pub far: f32,
    /// Return at most the nearest hit and prune everything behind it
    pub first_hit_only: bool,
}

impl RaycastQuery {
    /// Query along `ray` against every layer, unbounded, first hit only
    pub fn new(ray: Ray) -> Self {
        Self {
            ray,
            layers: Layers::ALL,
            near: 0.0,
            far: f32::INFINITY,
            first_hit_only: true,
        }
    }

    /// Restrict the query to `layers`
    pub fn with_layers(mut self, layers: Layers) -> Self {
        self.layers = layers;
        self
    }

    /// Restrict hits to `[near, far]`
    pub fn with_range(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Choose between nearest-hit and all-hits mode
    pub fn first_hit_only(mut self, first_hit_only: bool) -> Self {
        self.first_hit_only = first_hit_only;
        self
    }
}

/// One intersection reported by a raycast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// World-space distance from the ray origin
    pub distance: f32,
    /// World-space hit point
    pub point: Vec3,
    /// Entry that was hit
    pub key: SpatialKey,
    /// Scene node owning the hit item
    pub node: NodeId,
    /// Entity owning the hit node
    pub entity: Option<EntityId>,
}

/// Contract every spatial index implementation satisfies
///
/// Hits are always returned nearest first.
pub trait SpatialIndex {
    /// Add an item and return the key that tracks it
    fn insert(&mut self, item: RenderItem) -> SpatialKey;

    /// Refit an item after its world matrix changed
    ///
    /// Returns `false` for an unknown key.
    fn move_item(&mut self, key: SpatialKey, matrix: &Mat4) -> bool;

    /// Change the layers an item answers raycasts on
    fn set_layers(&mut self, key: SpatialKey, layers: Layers) -> bool;

    /// Remove an item, handing it back
    fn remove(&mut self, key: SpatialKey) -> Option<RenderItem>;

    /// Intersect the query ray with every eligible item
    fn raycast(&self, query: &RaycastQuery) -> Vec<RaycastHit>;

    /// Look up an item
    fn get(&self, key: SpatialKey) -> Option<&RenderItem>;

    /// Number of items
    fn len(&self) -> usize;

    /// Remove every item
    fn clear(&mut self);

    /// True when no item is indexed
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

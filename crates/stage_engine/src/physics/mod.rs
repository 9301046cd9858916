//! Physics collaborator interface
//!
//! The stage does not simulate anything. Nodes that carry a physics body
//! register an actor with a [`PhysicsWorld`] when they mount and keep it in
//! step with their world matrix. [`ActorRegistry`] is a kinematic
//! bookkeeping world that records actors without simulating them.

use std::cell::RefCell;
use std::rc::Rc;

use slotmap::SlotMap;

use crate::foundation::math::{Mat4, Vec3};
use crate::render::PrimitiveKind;
use crate::scene::EntityId;
use crate::spatial::Aabb;

/// Physics errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    /// No exact collider exists for this primitive
    #[error("no collider approximation for {0:?}")]
    UnsupportedShape(PrimitiveKind),

    /// The actor description was rejected
    #[error("invalid actor: {0}")]
    InvalidActor(String),
}

/// How a body responds to the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    /// Never moves
    #[default]
    Static,
    /// Moved by its node, pushes dynamic bodies
    Kinematic,
    /// Moved by the simulation
    Dynamic,
}

/// Collision shape in the actor's local space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderShape {
    /// Box with the given half extents
    Box {
        /// Half size per axis
        half_extents: Vec3,
    },
    /// Sphere
    Sphere {
        /// Radius
        radius: f32,
    },
    /// Y-aligned cylinder
    Cylinder {
        /// Radius
        radius: f32,
        /// Half of the height
        half_height: f32,
    },
}

const MIN_EXTENT: f32 = 1e-3;

impl ColliderShape {
    /// Exact collider for a unit primitive scaled by `scale`
    pub fn approximate(kind: PrimitiveKind, scale: Vec3) -> Result<Self, PhysicsError> {
        match kind {
            PrimitiveKind::Box => Ok(Self::Box {
                half_extents: (scale * 0.5).map(|v| v.abs().max(MIN_EXTENT)),
            }),
            PrimitiveKind::Sphere => Ok(Self::Sphere {
                radius: scale.abs().max().max(MIN_EXTENT),
            }),
            PrimitiveKind::Cylinder => Ok(Self::Cylinder {
                radius: scale.x.abs().max(scale.z.abs()).max(MIN_EXTENT),
                half_height: (scale.y.abs() * 0.5).max(MIN_EXTENT),
            }),
            PrimitiveKind::Cone | PrimitiveKind::Torus | PrimitiveKind::Plane => {
                Err(PhysicsError::UnsupportedShape(kind))
            }
        }
    }

    /// Box enclosing scaled local bounds
    pub fn bounding_box(bounds: &Aabb, scale: Vec3) -> Self {
        let half = (bounds.max - bounds.min).component_mul(&scale) * 0.5;
        Self::Box {
            half_extents: half.map(|v| v.abs().max(MIN_EXTENT)),
        }
    }
}

/// Everything the physics world needs to create an actor
#[derive(Debug, Clone, PartialEq)]
pub struct ActorDesc {
    /// Collision shape
    pub shape: ColliderShape,
    /// Body type
    pub body: BodyKind,
    /// Mass for dynamic bodies
    pub mass: f32,
    /// Reports overlaps instead of colliding
    pub trigger: bool,
    /// Initial world matrix
    pub matrix: Mat4,
    /// Entity owning the actor
    pub entity: Option<EntityId>,
}

/// Called with the interpolated world matrix of a dynamic body
pub type InterpolateCallback = Box<dyn FnMut(&Mat4)>;

/// Called with the entity on the other side of a contact or trigger
pub type ContactCallback = Box<dyn FnMut(Option<EntityId>)>;

/// Optional actor metadata and callbacks
#[derive(Default)]
pub struct ActorOptions {
    /// Free-form tag reported to the other side of contacts
    pub tag: Option<String>,
    /// Player owning the actor
    pub player_id: Option<String>,
    /// Dynamic body interpolation
    pub on_interpolate: Option<InterpolateCallback>,
    /// Contact began
    pub on_contact_start: Option<ContactCallback>,
    /// Contact ended
    pub on_contact_end: Option<ContactCallback>,
    /// Something entered this trigger
    pub on_trigger_enter: Option<ContactCallback>,
    /// Something left this trigger
    pub on_trigger_leave: Option<ContactCallback>,
}

impl std::fmt::Debug for ActorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorOptions")
            .field("tag", &self.tag)
            .field("player_id", &self.player_id)
            .finish_non_exhaustive()
    }
}

/// A live actor owned by a scene node
pub trait ActorHandle: std::fmt::Debug {
    /// Teleport or drive the actor to a new world matrix
    fn move_to(&mut self, matrix: &Mat4);

    /// Remove the actor from its world
    fn destroy(self: Box<Self>);
}

/// The physics world as seen by scene nodes
pub trait PhysicsWorld {
    /// Register an actor
    fn add_actor(&mut self, desc: ActorDesc, options: ActorOptions) -> Result<Box<dyn ActorHandle>, PhysicsError>;

    /// Number of live actors
    fn actor_count(&self) -> usize;
}

slotmap::new_key_type! {
    /// Identity of an actor in an [`ActorRegistry`]
    pub struct ActorKey;
}

/// Stored state of a registered actor
#[derive(Debug, Clone, PartialEq)]
pub struct ActorRecord {
    /// Creation parameters, with `matrix` tracking the latest move
    pub desc: ActorDesc,
    /// Tag from the actor options
    pub tag: Option<String>,
    /// Moves received since creation
    pub moves: usize,
}

type Actors = Rc<RefCell<SlotMap<ActorKey, ActorRecord>>>;

/// Physics world that records actors without simulating them
#[derive(Debug, Default, Clone)]
pub struct ActorRegistry {
    actors: Actors,
}

impl ActorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every live actor
    pub fn records(&self) -> Vec<ActorRecord> {
        self.actors.borrow().values().cloned().collect()
    }
}

impl PhysicsWorld for ActorRegistry {
    fn add_actor(&mut self, desc: ActorDesc, options: ActorOptions) -> Result<Box<dyn ActorHandle>, PhysicsError> {
        if desc.body == BodyKind::Dynamic && !(desc.mass.is_finite() && desc.mass > 0.0) {
            return Err(PhysicsError::InvalidActor(format!("dynamic mass {}", desc.mass)));
        }
        let key = self.actors.borrow_mut().insert(ActorRecord {
            desc,
            tag: options.tag,
            moves: 0,
        });
        log::trace!("Actor {:?} added", key);
        Ok(Box::new(RegistryActor {
            actors: Rc::clone(&self.actors),
            key,
        }))
    }

    fn actor_count(&self) -> usize {
        self.actors.borrow().len()
    }
}

#[derive(Debug)]
struct RegistryActor {
    actors: Actors,
    key: ActorKey,
}

impl ActorHandle for RegistryActor {
    fn move_to(&mut self, matrix: &Mat4) {
        if let Some(record) = self.actors.borrow_mut().get_mut(self.key) {
            record.desc.matrix = *matrix;
            record.moves += 1;
        }
    }

    fn destroy(self: Box<Self>) {
        self.actors.borrow_mut().remove(self.key);
        log::trace!("Actor {:?} destroyed", self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_shapes() {
        let scale = Vec3::new(2.0, 4.0, 1.0);
        match ColliderShape::approximate(PrimitiveKind::Box, scale).unwrap() {
            ColliderShape::Box { half_extents } => assert_relative_eq!(half_extents, Vec3::new(1.0, 2.0, 0.5)),
            other => panic!("unexpected {other:?}"),
        }
        match ColliderShape::approximate(PrimitiveKind::Cylinder, scale).unwrap() {
            ColliderShape::Cylinder { radius, half_height } => {
                assert_relative_eq!(radius, 2.0);
                assert_relative_eq!(half_height, 2.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_shapes() {
        for kind in [PrimitiveKind::Cone, PrimitiveKind::Torus, PrimitiveKind::Plane] {
            assert_eq!(
                ColliderShape::approximate(kind, Vec3::new(1.0, 1.0, 1.0)),
                Err(PhysicsError::UnsupportedShape(kind))
            );
        }
    }

    #[test]
    fn test_registry_tracks_moves_and_destroy() {
        let mut registry = ActorRegistry::new();
        let desc = ActorDesc {
            shape: ColliderShape::Sphere { radius: 1.0 },
            body: BodyKind::Kinematic,
            mass: 1.0,
            trigger: false,
            matrix: Mat4::identity(),
            entity: None,
        };
        let mut actor = registry.add_actor(desc, ActorOptions::default()).unwrap();
        actor.move_to(&Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(registry.records()[0].moves, 1);
        actor.destroy();
        assert_eq!(registry.actor_count(), 0);
    }
}

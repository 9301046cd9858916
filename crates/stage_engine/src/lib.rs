//! # Stage Engine
//!
//! An instanced scene stage: large, constantly changing populations of
//! scene objects drawn through a small number of instanced draws, with a
//! spatial index for picking and a dirty scheduler that collapses a frame's
//! worth of property writes into one flush.
//!
//! ## Features
//!
//! - **Dynamic batching**: objects sharing geometry, material and shadow
//!   flags share one instanced draw with O(1) insert and swap-compaction
//!   removal
//! - **Per-instance appearance**: colour and emission buffers read by a
//!   declaratively patched shader
//! - **Loose octree**: incremental insert/move/remove and nearest-first,
//!   first-hit raycasts with layer masks
//! - **Deferred updates**: world matrices recomputed once per frame phase
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stage_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut world = World::new(StageConfig::default())?;
//!     let prim = PrimNode::new(PrimitiveKind::Sphere).with_color("#ff8800")?;
//!     let node = world.add(None, SceneNode::new(NodeKind::Prim(prim)))?;
//!     world.tick(1.0 / 60.0, &mut ());
//!
//!     world.set_position(node, Vec3::new(0.0, 2.0, 0.0))?;
//!     world.tick(1.0 / 60.0, &mut ());
//!     println!("{:?}", world.stage().stats());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod render;
pub mod spatial;
pub mod stage;
pub mod scene;
pub mod physics;
pub mod assets;
pub mod world;

#[cfg(test)]
mod tests;

/// Common imports for stage users
pub mod prelude {
    pub use crate::{
        assets::{AssetKind, AssetLoader, LoadedAsset, MemoryLoader},
        config::{Config, StageConfig},
        foundation::math::{Mat4, Quat, Transform, Vec2, Vec3},
        physics::{ActorRegistry, BodyKind, PhysicsWorld},
        render::{Camera, Color, Emissive, Material, MaterialOptions, PrimitiveKind, Viewport},
        scene::{MeshNode, MeshSource, NodeId, NodeKind, PrimNode, PrimPhysics, Scene, SceneNode},
        spatial::{Layers, RaycastHit, RaycastQuery},
        stage::{InstanceHandle, Stage, StageError, StageStats},
        world::{FrameHooks, World},
    };
}

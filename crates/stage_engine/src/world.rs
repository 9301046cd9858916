//! Frame loop wiring
//!
//! [`World`] ties the scene to the stage and its collaborators and runs
//! the fixed frame phases: update, flush, late update, flush, commit.

use crate::assets::{AssetLoader, MemoryLoader};
use crate::config::{ConfigError, StageConfig};
use crate::foundation::math::{Quat, Transform, Vec2, Vec3};
use crate::physics::{ActorRegistry, PhysicsWorld};
use crate::scene::{FlushReport, MeshSource, NodeError, NodeId, Scene, SceneContext, SceneNode};
use crate::render::MaterialRef;
use crate::spatial::{Layers, RaycastHit};
use crate::stage::{Stage, StageError};

/// Per-frame callbacks, typically the scripting layer
pub trait FrameHooks {
    /// Runs before the first flush
    fn update(&mut self, _world: &mut World, _delta: f32) {}

    /// Runs between the two flushes
    fn late_update(&mut self, _world: &mut World, _delta: f32) {}
}

impl FrameHooks for () {}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number, starting at 1
    pub frame: u64,
    /// Async loads delivered at the start of the frame
    pub loads: usize,
    /// Flush after update
    pub update: FlushReport,
    /// Flush after late update
    pub late_update: FlushReport,
}

/// Scene, stage and collaborators
pub struct World {
    scene: Scene,
    stage: Stage,
    physics: Box<dyn PhysicsWorld>,
    loader: Box<dyn AssetLoader>,
    frame: u64,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("frame", &self.frame)
            .field("nodes", &self.scene.len())
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

impl World {
    /// World with a kinematic actor registry and an in-memory loader
    pub fn new(config: StageConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_collaborators(
            Stage::new(config)?,
            Box::new(ActorRegistry::new()),
            Box::new(MemoryLoader::new()),
        ))
    }

    /// World over explicit collaborators
    pub fn with_collaborators(stage: Stage, physics: Box<dyn PhysicsWorld>, loader: Box<dyn AssetLoader>) -> Self {
        Self {
            scene: Scene::new(),
            stage,
            physics,
            loader,
            frame: 0,
        }
    }

    fn split(&mut self) -> (&mut Scene, SceneContext<'_>) {
        let Self {
            scene,
            stage,
            physics,
            loader,
            ..
        } = self;
        (
            scene,
            SceneContext {
                stage,
                physics: physics.as_mut(),
                loader: loader.as_mut(),
            },
        )
    }

    /// The scene graph
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The stage
    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Mutable stage, for camera and viewport changes
    pub fn stage_mut(&mut self) -> &mut Stage {
        &mut self.stage
    }

    /// The physics world
    pub fn physics(&self) -> &dyn PhysicsWorld {
        self.physics.as_ref()
    }

    /// Frames ticked so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Run one frame
    pub fn tick(&mut self, delta: f32, hooks: &mut dyn FrameHooks) -> FrameReport {
        self.frame += 1;
        let loads = self.deliver_loads();
        hooks.update(self, delta);
        let update = self.flush();
        hooks.late_update(self, delta);
        let late_update = self.flush();
        self.stage.commit_frame();
        FrameReport {
            frame: self.frame,
            loads,
            update,
            late_update,
        }
    }

    /// Flush dirty nodes now
    pub fn flush(&mut self) -> FlushReport {
        let (scene, mut ctx) = self.split();
        scene.flush(&mut ctx)
    }

    /// Hand completed loads to the nodes waiting on them
    pub fn deliver_loads(&mut self) -> usize {
        let completed = self.loader.poll();
        let (scene, mut ctx) = self.split();
        let mut delivered = 0;
        for load in completed {
            for ticket in scene.tickets_for(&load.url) {
                if scene.complete_load(ticket, load.asset.clone(), &mut ctx) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Add a node
    pub fn add(&mut self, parent: Option<NodeId>, node: SceneNode) -> Result<NodeId, NodeError> {
        self.scene.add(parent, node)
    }

    /// Remove a node and its subtree
    pub fn remove(&mut self, id: NodeId) -> Result<usize, NodeError> {
        let (scene, mut ctx) = self.split();
        scene.remove(id, &mut ctx)
    }

    /// Reparent a node
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), NodeError> {
        self.scene.set_parent(id, parent)
    }

    /// Replace a node's local transform
    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> Result<(), NodeError> {
        self.scene.set_transform(id, transform)
    }

    /// Set a node's local position
    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> Result<(), NodeError> {
        self.scene.set_position(id, position)
    }

    /// Set a node's local rotation
    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) -> Result<(), NodeError> {
        self.scene.set_rotation(id, rotation)
    }

    /// Set a node's local scale
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> Result<(), NodeError> {
        self.scene.set_scale(id, scale)
    }

    /// Show or hide a node
    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> Result<(), NodeError> {
        self.scene.set_visible(id, visible)
    }

    /// Change a node's raycast layers
    pub fn set_layers(&mut self, id: NodeId, layers: Layers) -> Result<(), NodeError> {
        self.scene.set_layers(id, layers, &mut self.stage)
    }

    /// Change a prim's kind
    pub fn set_prim_kind(&mut self, id: NodeId, kind: &str) -> Result<(), NodeError> {
        self.scene.set_prim_kind(id, kind)
    }

    /// Change a prim's size
    pub fn set_prim_size(&mut self, id: NodeId, size: &[f32]) -> Result<(), NodeError> {
        self.scene.set_prim_size(id, size)
    }

    /// Change a prim's colour
    pub fn set_prim_color(&mut self, id: NodeId, color: &str) -> Result<(), NodeError> {
        self.scene.set_prim_color(id, color, &mut self.stage)
    }

    /// Change or clear a prim's emission
    pub fn set_prim_emissive(&mut self, id: NodeId, emissive: Option<(&str, f32)>) -> Result<(), NodeError> {
        self.scene.set_prim_emissive(id, emissive, &mut self.stage)
    }

    /// Toggle a prim's shadow casting
    pub fn set_prim_cast_shadow(&mut self, id: NodeId, value: bool) -> Result<(), NodeError> {
        self.scene.set_prim_cast_shadow(id, value)
    }

    /// Toggle a prim's shadow receiving
    pub fn set_prim_receive_shadow(&mut self, id: NodeId, value: bool) -> Result<(), NodeError> {
        self.scene.set_prim_receive_shadow(id, value)
    }

    /// Swap a mesh's material
    pub fn set_mesh_material(&mut self, id: NodeId, material: MaterialRef) -> Result<(), NodeError> {
        self.scene.set_mesh_material(id, material)
    }

    /// Swap a mesh's geometry source
    pub fn set_mesh_source(&mut self, id: NodeId, source: MeshSource) -> Result<(), NodeError> {
        self.scene.set_mesh_source(id, source)
    }

    /// Raycast through a screen position
    pub fn raycast_pointer(
        &self,
        screen: Vec2,
        layers: Option<Layers>,
        near: f32,
        far: f32,
    ) -> Result<Vec<RaycastHit>, StageError> {
        self.stage.raycast_pointer(screen, layers, near, far)
    }

    /// Raycast through the viewport center
    pub fn raycast_reticle(&self, layers: Option<Layers>, near: f32, far: f32) -> Result<Vec<RaycastHit>, StageError> {
        self.stage.raycast_reticle(layers, near, far)
    }

    /// Remove every node and tear the stage down
    pub fn destroy(&mut self) {
        let (scene, mut ctx) = self.split();
        scene.clear(&mut ctx);
        self.stage.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PrimitiveKind;
    use crate::scene::{NodeKind, PrimNode};

    struct Spinner {
        node: Option<NodeId>,
        moves: usize,
    }

    impl FrameHooks for Spinner {
        fn update(&mut self, world: &mut World, _delta: f32) {
            if self.node.is_none() {
                let prim = SceneNode::new(NodeKind::Prim(PrimNode::new(PrimitiveKind::Box)));
                self.node = world.add(None, prim).ok();
            }
        }

        fn late_update(&mut self, world: &mut World, _delta: f32) {
            if let Some(node) = self.node {
                for step in 0..5 {
                    world.set_position(node, Vec3::new(step as f32, 0.0, 0.0)).unwrap();
                    self.moves += 1;
                }
            }
        }
    }

    #[test]
    fn test_tick_runs_phases_in_order() {
        let mut world = World::new(StageConfig::default()).unwrap();
        let mut hooks = Spinner { node: None, moves: 0 };

        let first = world.tick(0.016, &mut hooks);
        assert_eq!(first.frame, 1);
        assert_eq!(first.update.rebuilt, 1);
        assert_eq!(first.late_update.moved, 1);
        assert_eq!(hooks.moves, 5);

        let node = hooks.node.unwrap();
        let batch = world.stage().batch_for(world.scene().node(node).unwrap().handle().unwrap()).unwrap();
        assert_eq!(batch.instance_count(), 1);
        assert!(!batch.is_dirty());
    }

    #[test]
    fn test_destroy_empties_world() {
        let mut world = World::new(StageConfig::default()).unwrap();
        let mut hooks = Spinner { node: None, moves: 0 };
        world.tick(0.016, &mut hooks);
        world.destroy();
        assert!(world.scene().is_empty());
        assert_eq!(world.stage().stats().instances, 0);
        assert_eq!(world.physics().actor_count(), 0);
    }
}

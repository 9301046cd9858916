//! The scene graph
//!
//! [`Scene`] owns every node in an arena and a [`DirtyScheduler`]. Node
//! mutations go through the scene so the right flags get set; the stage,
//! physics world and asset loader are only touched during [`Scene::flush`],
//! node removal, and the immediate per-instance colour writes.

use std::rc::Rc;

use slotmap::SlotMap;

use crate::assets::{AssetKind, AssetLoader, LoadedAsset};
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};
use crate::physics::{ActorDesc, ActorHandle, ActorOptions, ColliderShape, PhysicsWorld};
use crate::render::{Geometry, MaterialRef};
use crate::spatial::Layers;
use crate::stage::{InstanceHandle, MeshOptions, PrimitiveOptions, Stage};

use super::node::{MeshNode, MeshSource, NodeKind, SceneNode};
use super::prim::{PrimChange, PrimNode, PrimPhysics};
use super::scheduler::{Commit, DirtyScheduler};
use super::{EntityId, MountTicket, NodeError, NodeId};

/// Collaborators a flush mounts into
pub struct SceneContext<'a> {
    /// Render stage
    pub stage: &'a mut Stage,
    /// Physics world
    pub physics: &'a mut dyn PhysicsWorld,
    /// Asset loader
    pub loader: &'a mut dyn AssetLoader,
}

/// What a flush did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Nodes committed
    pub committed: usize,
    /// Commits that moved a render representation
    pub moved: usize,
    /// Commits that remounted
    pub rebuilt: usize,
}

/// Arena of scene nodes plus the dirty queue
#[derive(Debug, Default)]
pub struct Scene {
    nodes: SlotMap<NodeId, SceneNode>,
    roots: Vec<NodeId>,
    scheduler: DirtyScheduler,
}

impl Scene {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent` (or as a root); it mounts on the next flush
    pub fn add(&mut self, parent: Option<NodeId>, mut node: SceneNode) -> Result<NodeId, NodeError> {
        if parent.is_some_and(|parent| !self.nodes.contains_key(parent)) {
            return Err(NodeError::UnknownNode);
        }
        node.parent = parent;
        let id = self.nodes.insert(node);
        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        self.scheduler.mark(&mut self.nodes, id);
        Ok(id)
    }

    /// Remove a node and its subtree, unmounting everything immediately
    ///
    /// Returns the number of nodes removed.
    pub fn remove(&mut self, id: NodeId, ctx: &mut SceneContext<'_>) -> Result<usize, NodeError> {
        if !self.nodes.contains_key(id) {
            return Err(NodeError::UnknownNode);
        }
        self.detach(id);
        let mut stack = vec![id];
        let mut removed = 0;
        while let Some(next) = stack.pop() {
            if let Some(mut node) = self.nodes.remove(next) {
                stack.extend(node.children.iter().copied());
                Self::unmount(&mut node, ctx);
                removed += 1;
            }
        }
        log::trace!("Removed {} nodes", removed);
        Ok(removed)
    }

    /// Remove every node
    pub fn clear(&mut self, ctx: &mut SceneContext<'_>) {
        for root in std::mem::take(&mut self.roots) {
            if let Some(node) = self.nodes.get_mut(root) {
                node.parent = None;
            }
            let _ = self.remove(root, ctx);
        }
    }

    fn detach(&mut self, id: NodeId) {
        match self.nodes.get(id).and_then(|node| node.parent) {
            Some(parent) => {
                if let Some(parent) = self.nodes.get_mut(parent) {
                    parent.children.retain(|child| *child != id);
                }
            }
            None => self.roots.retain(|root| *root != id),
        }
    }

    /// Move a node under a new parent, keeping its local transform
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), NodeError> {
        if !self.nodes.contains_key(id) {
            return Err(NodeError::UnknownNode);
        }
        if let Some(parent) = parent {
            let mut cursor = Some(parent);
            while let Some(ancestor) = cursor {
                if ancestor == id {
                    return Err(NodeError::Cycle);
                }
                cursor = self.nodes.get(ancestor).ok_or(NodeError::UnknownNode)?.parent;
            }
        }
        self.detach(id);
        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        let node = &mut self.nodes[id];
        node.parent = parent;
        node.transformed = true;
        self.scheduler.mark(&mut self.nodes, id);
        Ok(())
    }

    fn modify_transform(&mut self, id: NodeId, modify: impl FnOnce(&mut Transform)) -> Result<(), NodeError> {
        let node = self.nodes.get_mut(id).ok_or(NodeError::UnknownNode)?;
        modify(&mut node.transform);
        node.transformed = true;
        self.scheduler.mark(&mut self.nodes, id);
        Ok(())
    }

    /// Replace the local transform
    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> Result<(), NodeError> {
        self.modify_transform(id, |t| *t = transform)
    }

    /// Set the local position
    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> Result<(), NodeError> {
        self.modify_transform(id, |t| t.position = position)
    }

    /// Set the local rotation
    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) -> Result<(), NodeError> {
        self.modify_transform(id, |t| t.rotation = rotation)
    }

    /// Set the local scale
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> Result<(), NodeError> {
        self.modify_transform(id, |t| t.scale = scale)
    }

    /// Show or hide a node and its subtree
    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> Result<(), NodeError> {
        let node = self.nodes.get_mut(id).ok_or(NodeError::UnknownNode)?;
        if node.visible != visible {
            node.visible = visible;
            self.scheduler.mark(&mut self.nodes, id);
        }
        Ok(())
    }

    /// Change raycast layers, applied to the mounted instance immediately
    pub fn set_layers(&mut self, id: NodeId, layers: Layers, stage: &mut Stage) -> Result<(), NodeError> {
        let node = self.nodes.get_mut(id).ok_or(NodeError::UnknownNode)?;
        node.layers = layers;
        if let Some(handle) = &node.render {
            if let Err(err) = stage.set_instance_layers(handle, layers) {
                log::warn!("Layer update failed: {}", err);
            }
        }
        Ok(())
    }

    fn apply_prim(
        &mut self,
        id: NodeId,
        write: impl FnOnce(&mut PrimNode) -> Result<PrimChange, NodeError>,
    ) -> Result<PrimChange, NodeError> {
        let node = self.nodes.get_mut(id).ok_or(NodeError::UnknownNode)?;
        let NodeKind::Prim(prim) = &mut node.kind else {
            return Err(NodeError::WrongKind("prim"));
        };
        let change = write(prim)?;
        match change {
            PrimChange::Rebuild => {
                node.needs_rebuild = true;
                self.scheduler.mark(&mut self.nodes, id);
            }
            PrimChange::Transform => {
                node.transformed = true;
                node.reshaped |= node.actor.is_some();
                self.scheduler.mark(&mut self.nodes, id);
            }
            PrimChange::Unchanged | PrimChange::Color(_) | PrimChange::Emissive(_) => {}
        }
        Ok(change)
    }

    /// Change the primitive kind; remounts on the next flush
    pub fn set_prim_kind(&mut self, id: NodeId, kind: &str) -> Result<(), NodeError> {
        self.apply_prim(id, |prim| prim.set_kind(kind)).map(drop)
    }

    /// Change the primitive size; only the render matrix changes
    pub fn set_prim_size(&mut self, id: NodeId, size: &[f32]) -> Result<(), NodeError> {
        self.apply_prim(id, |prim| prim.set_size(size)).map(drop)
    }

    /// Toggle shadow casting; remounts on the next flush
    pub fn set_prim_cast_shadow(&mut self, id: NodeId, value: bool) -> Result<(), NodeError> {
        self.apply_prim(id, |prim| Ok(prim.set_cast_shadow(value))).map(drop)
    }

    /// Toggle shadow receiving; remounts on the next flush
    pub fn set_prim_receive_shadow(&mut self, id: NodeId, value: bool) -> Result<(), NodeError> {
        self.apply_prim(id, |prim| Ok(prim.set_receive_shadow(value))).map(drop)
    }

    /// Change the instance colour, written straight into the batch
    pub fn set_prim_color(&mut self, id: NodeId, color: &str, stage: &mut Stage) -> Result<(), NodeError> {
        if let PrimChange::Color(color) = self.apply_prim(id, |prim| prim.set_color(color))? {
            if let Some(handle) = self.nodes.get(id).and_then(|node| node.render.as_ref()) {
                if let Err(err) = stage.set_instance_color(handle, color) {
                    log::warn!("Instance color write failed: {}", err);
                }
            }
        }
        Ok(())
    }

    /// Change the instance emission, written straight into the batch
    pub fn set_prim_emissive(
        &mut self,
        id: NodeId,
        emissive: Option<(&str, f32)>,
        stage: &mut Stage,
    ) -> Result<(), NodeError> {
        if let PrimChange::Emissive(emissive) = self.apply_prim(id, |prim| prim.set_emissive(emissive))? {
            if let Some(handle) = self.nodes.get(id).and_then(|node| node.render.as_ref()) {
                if let Err(err) = stage.set_instance_emissive(handle, emissive) {
                    log::warn!("Instance emissive write failed: {}", err);
                }
            }
        }
        Ok(())
    }

    fn mesh_mut(&mut self, id: NodeId) -> Result<&mut MeshNode, NodeError> {
        match &mut self.nodes.get_mut(id).ok_or(NodeError::UnknownNode)?.kind {
            NodeKind::Mesh(mesh) => Ok(mesh),
            NodeKind::Group | NodeKind::Prim(_) => Err(NodeError::WrongKind("mesh")),
        }
    }

    fn rebuild(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.needs_rebuild = true;
        }
        self.scheduler.mark(&mut self.nodes, id);
    }

    /// Swap a mesh node's material; remounts on the next flush
    pub fn set_mesh_material(&mut self, id: NodeId, material: MaterialRef) -> Result<(), NodeError> {
        self.mesh_mut(id)?.material = material;
        self.rebuild(id);
        Ok(())
    }

    /// Swap a mesh node's geometry source; remounts on the next flush
    pub fn set_mesh_source(&mut self, id: NodeId, source: MeshSource) -> Result<(), NodeError> {
        self.mesh_mut(id)?.source = source;
        self.rebuild(id);
        Ok(())
    }

    /// Toggle a mesh node's shadow flags; remounts on the next flush
    pub fn set_mesh_shadows(&mut self, id: NodeId, cast: bool, receive: bool) -> Result<(), NodeError> {
        let mesh = self.mesh_mut(id)?;
        if mesh.cast_shadow == cast && mesh.receive_shadow == receive {
            return Ok(());
        }
        mesh.cast_shadow = cast;
        mesh.receive_shadow = receive;
        self.rebuild(id);
        Ok(())
    }

    /// Queue a node for the next flush without changing it
    pub fn mark_dirty(&mut self, id: NodeId) {
        self.scheduler.mark(&mut self.nodes, id);
    }

    /// Recompute dirty world matrices and sync render representations
    pub fn flush(&mut self, ctx: &mut SceneContext<'_>) -> FlushReport {
        let mut report = FlushReport::default();
        for commit in self.scheduler.flush(&mut self.nodes) {
            self.commit(commit, ctx, &mut report);
        }
        if report.committed > 0 {
            log::trace!("Flush: {:?}", report);
        }
        report
    }

    fn commit(&mut self, commit: Commit, ctx: &mut SceneContext<'_>, report: &mut FlushReport) {
        let Some(node) = self.nodes.get_mut(commit.node) else {
            return;
        };
        report.committed += 1;
        if node.needs_rebuild {
            node.needs_rebuild = false;
            Self::unmount(node, ctx);
            if node.active {
                Self::mount(commit.node, node, ctx);
            }
            report.rebuilt += 1;
            return;
        }
        if commit.moved {
            report.moved += 1;
            let matrix = node.render_matrix();
            if let Some(handle) = &node.render {
                if let Err(err) = ctx.stage.move_instance(handle, &matrix) {
                    log::warn!("Instance move failed: {}", err);
                }
            }
            if let Some(actor) = node.actor.as_mut() {
                actor.move_to(&node.world);
            }
        }
        if node.reshaped {
            node.reshaped = false;
            Self::rebuild_actor(node, ctx);
        }
    }

    /// Replace a prim's collider after a size change
    fn rebuild_actor(node: &mut SceneNode, ctx: &mut SceneContext<'_>) {
        let NodeKind::Prim(prim) = &node.kind else {
            return;
        };
        let Some(physics) = prim.physics() else {
            return;
        };
        if let Some(actor) = node.actor.take() {
            actor.destroy();
        }
        let geometry = ctx.stage.geometry(prim.kind());
        node.actor = add_actor(prim, physics, &geometry, node.world, node.entity, ctx.physics);
    }

    fn mount(id: NodeId, node: &mut SceneNode, ctx: &mut SceneContext<'_>) {
        node.generation += 1;
        let matrix = node.render_matrix();
        match &node.kind {
            NodeKind::Group => {}
            NodeKind::Prim(prim) => {
                let geometry = ctx.stage.geometry(prim.kind());
                let handle = ctx.stage.insert_primitive(PrimitiveOptions {
                    geometry: Rc::clone(&geometry),
                    material: None,
                    cast_shadow: prim.cast_shadow(),
                    receive_shadow: prim.receive_shadow(),
                    node: id,
                    entity: node.entity,
                    layers: node.layers,
                    matrix,
                    color: Some(prim.color()),
                    emissive: prim.emissive(),
                });
                node.actor = prim
                    .physics()
                    .and_then(|physics| add_actor(prim, physics, &geometry, node.world, node.entity, ctx.physics));
                node.render = Some(handle);
            }
            NodeKind::Mesh(mesh) => {
                let geometry = match &mesh.source {
                    MeshSource::Geometry(geometry) => Some(Rc::clone(geometry)),
                    MeshSource::Url(url) => match ctx.loader.get(AssetKind::Model, url) {
                        Some(LoadedAsset::Geometry(geometry)) => Some(geometry),
                        Some(LoadedAsset::Texture(_)) => {
                            log::warn!("{} is not a model, mesh left unmounted", url);
                            None
                        }
                        None => {
                            ctx.loader.request(AssetKind::Model, url);
                            node.pending = Some(MountTicket {
                                node: id,
                                generation: node.generation,
                            });
                            None
                        }
                    },
                };
                if let Some(geometry) = geometry {
                    node.render = Some(insert_mesh(ctx.stage, id, mesh, geometry, matrix, node.entity, node.layers));
                }
            }
        }
    }

    fn unmount(node: &mut SceneNode, ctx: &mut SceneContext<'_>) {
        node.generation += 1;
        node.pending = None;
        node.reshaped = false;
        if let Some(handle) = node.render.take() {
            if let Err(err) = ctx.stage.destroy_instance(handle) {
                log::warn!("Instance destroy failed: {}", err);
            }
        }
        if let Some(actor) = node.actor.take() {
            actor.destroy();
        }
    }

    /// Finish an async mount
    ///
    /// Returns `false` and changes nothing when the ticket is stale: the
    /// node was removed, unmounted or remounted since the load started.
    pub fn complete_load(&mut self, ticket: MountTicket, asset: LoadedAsset, ctx: &mut SceneContext<'_>) -> bool {
        let Some(node) = self.nodes.get_mut(ticket.node) else {
            log::debug!("Dropping load for removed node {:?}", ticket.node);
            return false;
        };
        if node.pending != Some(ticket) || node.generation != ticket.generation {
            log::debug!(
                "Dropping stale load for {:?} (generation {} != {})",
                ticket.node,
                ticket.generation,
                node.generation
            );
            return false;
        }
        let LoadedAsset::Geometry(geometry) = asset else {
            log::warn!("Load for {:?} resolved to a texture, mesh left unmounted", ticket.node);
            node.pending = None;
            return false;
        };
        let NodeKind::Mesh(mesh) = &node.kind else {
            return false;
        };
        node.pending = None;
        let matrix = node.render_matrix();
        node.render = Some(insert_mesh(ctx.stage, ticket.node, mesh, geometry, matrix, node.entity, node.layers));
        true
    }

    /// Tickets of nodes waiting on `url`
    pub fn tickets_for(&self, url: &str) -> Vec<MountTicket> {
        self.nodes
            .values()
            .filter_map(|node| match (&node.kind, node.pending) {
                (NodeKind::Mesh(MeshNode { source: MeshSource::Url(src), .. }), Some(ticket)) if src == url => {
                    Some(ticket)
                }
                _ => None,
            })
            .collect()
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// Root nodes in insertion order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Every node
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the scene has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes waiting for the next flush
    pub fn pending_flush(&self) -> usize {
        self.scheduler.pending()
    }
}

fn insert_mesh(
    stage: &mut Stage,
    id: NodeId,
    mesh: &MeshNode,
    geometry: Rc<Geometry>,
    matrix: Mat4,
    entity: Option<EntityId>,
    layers: Layers,
) -> InstanceHandle {
    stage.insert(MeshOptions {
        geometry,
        material: Rc::clone(&mesh.material),
        linked: mesh.linked,
        cast_shadow: mesh.cast_shadow,
        receive_shadow: mesh.receive_shadow,
        node: id,
        entity,
        layers,
        matrix,
    })
}

fn add_actor(
    prim: &PrimNode,
    physics: &PrimPhysics,
    geometry: &Geometry,
    world: Mat4,
    entity: Option<EntityId>,
    physics_world: &mut dyn PhysicsWorld,
) -> Option<Box<dyn ActorHandle>> {
    let scale = prim.render_scale();
    let shape = ColliderShape::approximate(prim.kind(), scale).unwrap_or_else(|err| {
        log::warn!("{}; using a bounding box collider", err);
        ColliderShape::bounding_box(geometry.bounds(), scale)
    });
    let desc = ActorDesc {
        shape,
        body: physics.body,
        mass: physics.mass,
        trigger: physics.trigger,
        matrix: world,
        entity,
    };
    let options = ActorOptions {
        tag: physics.tag.clone(),
        ..ActorOptions::default()
    };
    physics_world
        .add_actor(desc, options)
        .map_err(|err| log::warn!("Actor creation failed: {}", err))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryLoader;
    use crate::physics::{ActorRegistry, BodyKind};
    use crate::render::{InstanceBatch, Material, MaterialOptions, PrimitiveKind};
    use approx::assert_relative_eq;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Fixture {
        scene: Scene,
        stage: Stage,
        physics: ActorRegistry,
        loader: MemoryLoader,
    }

    impl Fixture {
        fn flush(&mut self) -> FlushReport {
            let mut ctx = SceneContext {
                stage: &mut self.stage,
                physics: &mut self.physics,
                loader: &mut self.loader,
            };
            self.scene.flush(&mut ctx)
        }

        fn remove(&mut self, id: NodeId) -> usize {
            let mut ctx = SceneContext {
                stage: &mut self.stage,
                physics: &mut self.physics,
                loader: &mut self.loader,
            };
            self.scene.remove(id, &mut ctx).unwrap()
        }

        fn complete(&mut self, ticket: MountTicket, asset: LoadedAsset) -> bool {
            let mut ctx = SceneContext {
                stage: &mut self.stage,
                physics: &mut self.physics,
                loader: &mut self.loader,
            };
            self.scene.complete_load(ticket, asset, &mut ctx)
        }
    }

    fn prim_node(kind: PrimitiveKind) -> SceneNode {
        SceneNode::new(NodeKind::Prim(PrimNode::new(kind)))
    }

    fn url_mesh(url: &str) -> SceneNode {
        let material = Rc::new(RefCell::new(Material::new(&MaterialOptions::default())));
        SceneNode::new(NodeKind::Mesh(MeshNode::new(MeshSource::Url(url.to_string()), material)))
    }

    #[test]
    fn test_add_mounts_on_flush() {
        let mut fx = Fixture::default();
        let id = fx.scene.add(None, prim_node(PrimitiveKind::Box)).unwrap();
        assert!(!fx.scene.node(id).unwrap().is_mounted());
        let report = fx.flush();
        assert_eq!(report.rebuilt, 1);
        assert!(fx.scene.node(id).unwrap().is_mounted());
        assert_eq!(fx.stage.spatial().len(), 1);
    }

    #[test]
    fn test_reparent_rejects_cycles() {
        let mut fx = Fixture::default();
        let a = fx.scene.add(None, SceneNode::group()).unwrap();
        let b = fx.scene.add(Some(a), SceneNode::group()).unwrap();
        assert_eq!(fx.scene.set_parent(a, Some(b)), Err(NodeError::Cycle));
        assert_eq!(fx.scene.set_parent(a, Some(a)), Err(NodeError::Cycle));
        fx.scene.set_parent(b, None).unwrap();
        assert_eq!(fx.scene.roots(), &[a, b]);
    }

    #[test]
    fn test_remove_unmounts_subtree() {
        let mut fx = Fixture::default();
        let group = fx.scene.add(None, SceneNode::group()).unwrap();
        fx.scene.add(Some(group), prim_node(PrimitiveKind::Box)).unwrap();
        fx.scene.add(Some(group), prim_node(PrimitiveKind::Sphere)).unwrap();
        fx.flush();
        assert_eq!(fx.stage.spatial().len(), 2);

        assert_eq!(fx.remove(group), 3);
        assert!(fx.scene.is_empty());
        assert_eq!(fx.stage.spatial().len(), 0);
        assert!(fx.stage.batches().all(InstanceBatch::is_empty));
    }

    #[test]
    fn test_hidden_node_unmounts_and_returns() {
        let mut fx = Fixture::default();
        let id = fx.scene.add(None, prim_node(PrimitiveKind::Box)).unwrap();
        fx.flush();
        fx.scene.set_visible(id, false).unwrap();
        fx.flush();
        assert!(!fx.scene.node(id).unwrap().is_mounted());
        fx.scene.set_visible(id, true).unwrap();
        fx.flush();
        assert!(fx.scene.node(id).unwrap().is_mounted());
    }

    #[test]
    fn test_actor_follows_node() {
        let mut fx = Fixture::default();
        let prim = PrimNode::new(PrimitiveKind::Box).with_physics(PrimPhysics {
            body: BodyKind::Kinematic,
            ..PrimPhysics::default()
        });
        let id = fx.scene.add(None, SceneNode::new(NodeKind::Prim(prim))).unwrap();
        fx.flush();
        assert_eq!(fx.physics.actor_count(), 1);

        fx.scene.set_position(id, Vec3::new(0.0, 4.0, 0.0)).unwrap();
        fx.flush();
        let record = &fx.physics.records()[0];
        assert_eq!(record.moves, 1);
        assert_relative_eq!(record.desc.matrix[(1, 3)], 4.0);

        fx.remove(id);
        assert_eq!(fx.physics.actor_count(), 0);
    }

    #[test]
    fn test_resize_rebuilds_collider() {
        let mut fx = Fixture::default();
        let prim = PrimNode::new(PrimitiveKind::Box).with_physics(PrimPhysics {
            body: BodyKind::Kinematic,
            tag: Some("crate".to_string()),
            ..PrimPhysics::default()
        });
        let id = fx.scene.add(None, SceneNode::new(NodeKind::Prim(prim))).unwrap();
        fx.scene.set_position(id, Vec3::new(2.0, 0.0, 0.0)).unwrap();
        fx.flush();

        fx.scene.set_prim_size(id, &[4.0, 4.0, 4.0]).unwrap();
        let report = fx.flush();
        assert_eq!(report.rebuilt, 0);
        assert_eq!(fx.physics.actor_count(), 1);
        let record = &fx.physics.records()[0];
        assert_eq!(record.tag.as_deref(), Some("crate"));
        assert_relative_eq!(record.desc.matrix[(0, 3)], 2.0);
        let ColliderShape::Box { half_extents } = record.desc.shape else {
            panic!("expected a box collider, got {:?}", record.desc.shape);
        };
        assert_relative_eq!(half_extents, Vec3::new(2.0, 2.0, 2.0));
        assert!(!fx.scene.node(id).unwrap().reshaped);
    }

    #[test]
    fn test_resize_without_physics_adds_no_actor() {
        let mut fx = Fixture::default();
        let id = fx.scene.add(None, SceneNode::new(NodeKind::Prim(PrimNode::default()))).unwrap();
        fx.flush();
        fx.scene.set_prim_size(id, &[3.0]).unwrap();
        fx.flush();
        assert_eq!(fx.physics.actor_count(), 0);
    }

    #[test]
    fn test_unsupported_collider_falls_back_to_box() {
        let mut fx = Fixture::default();
        let prim = PrimNode::new(PrimitiveKind::Cone).with_physics(PrimPhysics::default());
        fx.scene.add(None, SceneNode::new(NodeKind::Prim(prim))).unwrap();
        fx.flush();
        let records = fx.physics.records();
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0].desc.shape, ColliderShape::Box { .. }));
    }

    #[test]
    fn test_async_mount_completes() {
        let mut fx = Fixture::default();
        let id = fx.scene.add(None, url_mesh("rock.glb")).unwrap();
        fx.flush();
        let ticket = fx.scene.node(id).unwrap().pending_mount().unwrap();
        assert_eq!(fx.scene.tickets_for("rock.glb"), vec![ticket]);
        assert_eq!(fx.loader.pending().len(), 1);

        let geometry = Rc::new(Geometry::primitive(PrimitiveKind::Box));
        assert!(fx.complete(ticket, LoadedAsset::Geometry(geometry)));
        assert!(fx.scene.node(id).unwrap().is_mounted());
        assert!(fx.scene.node(id).unwrap().pending_mount().is_none());
    }

    #[test]
    fn test_stale_load_is_dropped() {
        let mut fx = Fixture::default();
        let id = fx.scene.add(None, url_mesh("rock.glb")).unwrap();
        fx.flush();
        let stale = fx.scene.node(id).unwrap().pending_mount().unwrap();

        fx.scene.set_visible(id, false).unwrap();
        fx.flush();
        let geometry = Rc::new(Geometry::primitive(PrimitiveKind::Box));
        assert!(!fx.complete(stale, LoadedAsset::Geometry(Rc::clone(&geometry))));
        assert!(!fx.scene.node(id).unwrap().is_mounted());

        fx.scene.set_visible(id, true).unwrap();
        fx.flush();
        let fresh = fx.scene.node(id).unwrap().pending_mount().unwrap();
        assert_ne!(fresh, stale);
        assert!(!fx.complete(stale, LoadedAsset::Geometry(Rc::clone(&geometry))));
        assert!(fx.complete(fresh, LoadedAsset::Geometry(geometry)));
        assert_eq!(fx.stage.spatial().len(), 1);
    }

    #[test]
    fn test_prim_setters_need_a_prim() {
        let mut fx = Fixture::default();
        let group = fx.scene.add(None, SceneNode::group()).unwrap();
        assert_eq!(fx.scene.set_prim_kind(group, "box"), Err(NodeError::WrongKind("prim")));
        let prim = fx.scene.add(None, prim_node(PrimitiveKind::Box)).unwrap();
        assert!(fx.scene.set_prim_kind(prim, "prism").is_err());
        assert_eq!(fx.scene.node(prim).unwrap().prim().unwrap().kind(), PrimitiveKind::Box);
    }
}

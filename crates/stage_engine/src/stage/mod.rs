//! The stage: the public face of instanced rendering
//!
//! Scene nodes hand their render representation to the [`Stage`] and get
//! back an [`InstanceHandle`]. Linked meshes and primitives are bucketed by
//! [`BatchSignature`] into shared instanced draws; unlinked meshes get a
//! draw of their own. Every inserted object also gets a spatial index entry
//! so pointer and reticle raycasts can find it.

pub mod handle;
pub mod options;
pub mod stats;

pub use handle::InstanceHandle;
pub use options::{MeshOptions, PrimitiveOptions};
pub use stats::StageStats;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use slotmap::SlotMap;

use handle::HandleTarget;

use crate::config::{ConfigError, StageConfig};
use crate::foundation::math::{Mat4, Vec2};
use crate::render::{
    BatchSignature, Camera, Color, DrawId, DrawList, Emissive, Geometry, GeometryCache, InstanceAppearance,
    InstanceBatch, InstancedDraw, MaterialCache, MaterialRef, MeshDraw, MeshKey, PrimitiveKind, ShaderPatch,
    ShaderProgram, ShaderTemplate, Shading, Viewport,
};
use crate::scene::{EntityId, NodeId};
use crate::spatial::{Layers, LooseOctree, RaycastHit, RaycastQuery, RenderItem, SpatialIndex};

/// Stage errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    /// A screen-space raycast was requested before a viewport was set
    #[error("no viewport")]
    NoViewport,

    /// The camera cannot be inverted
    #[error("camera matrices are degenerate")]
    DegenerateCamera,

    /// Colour or emission set on an instance without appearance buffers
    #[error("instance does not support per-instance color or emissive")]
    AppearanceUnsupported,

    /// The handle does not name a live instance of this stage
    #[error("handle does not belong to a live instance of this stage")]
    UnknownHandle,
}

/// Owns every batch, single mesh, cache and the spatial index
pub struct Stage {
    config: StageConfig,
    geometries: GeometryCache,
    materials: MaterialCache,
    standard_template: ShaderTemplate,
    unlit_template: ShaderTemplate,
    batches: HashMap<BatchSignature, InstanceBatch>,
    meshes: SlotMap<MeshKey, MeshDraw>,
    draw_list: DrawList,
    spatial: Box<dyn SpatialIndex>,
    camera: Camera,
    viewport: Option<Viewport>,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("batches", &self.batches.len())
            .field("meshes", &self.meshes.len())
            .field("draw_calls", &self.draw_list.len())
            .field("spatial_items", &self.spatial.len())
            .finish()
    }
}

impl Default for Stage {
    fn default() -> Self {
        let config = StageConfig::default();
        let spatial = Box::new(LooseOctree::new(&config.spatial));
        Self::build(config, spatial)
    }
}

/// Resolve a material's program, dropping its patches if they cannot be applied
fn resolve_program(
    materials: &mut MaterialCache,
    template: &ShaderTemplate,
    material: &MaterialRef,
) -> Option<Rc<ShaderProgram>> {
    let result = materials.program(&material.borrow(), template);
    match result {
        Ok(program) => Some(program),
        Err(err) => {
            log::warn!("{}; falling back to the unpatched material", err);
            material.borrow_mut().patches.clear();
            let fallback = materials.program(&material.borrow(), template);
            fallback
                .map_err(|err| log::warn!("Unpatched program failed too: {}", err))
                .ok()
        }
    }
}

impl Stage {
    /// Create a stage backed by a loose octree
    pub fn new(config: StageConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let spatial = Box::new(LooseOctree::new(&config.spatial));
        Ok(Self::build(config, spatial))
    }

    /// Create a stage over a custom spatial index
    pub fn with_spatial_index(config: StageConfig, spatial: Box<dyn SpatialIndex>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, spatial))
    }

    fn build(config: StageConfig, spatial: Box<dyn SpatialIndex>) -> Self {
        log::info!(
            "Stage created (initial capacity {}, headroom {}, first-hit raycasts {})",
            config.batching.initial_capacity,
            config.batching.growth_headroom,
            config.raycast.first_hit_only
        );
        Self {
            config,
            geometries: GeometryCache::new(),
            materials: MaterialCache::new(),
            standard_template: ShaderTemplate::standard(),
            unlit_template: ShaderTemplate::unlit(),
            batches: HashMap::new(),
            meshes: SlotMap::with_key(),
            draw_list: DrawList::new(),
            spatial,
            camera: Camera::default(),
            viewport: None,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Shared unit geometry for a primitive kind
    pub fn geometry(&mut self, kind: PrimitiveKind) -> Rc<Geometry> {
        self.geometries.get(kind)
    }

    /// Material cache owned by this stage
    pub fn materials_mut(&mut self) -> &mut MaterialCache {
        &mut self.materials
    }

    /// Insert a mesh, batched when `linked` is set
    pub fn insert(&mut self, options: MeshOptions) -> InstanceHandle {
        if options.linked {
            self.insert_linked(options)
        } else {
            self.insert_single(options)
        }
    }

    /// Insert a mesh into the batch matching its geometry, material and
    /// shadow flags
    pub fn insert_linked(&mut self, options: MeshOptions) -> InstanceHandle {
        let source_id = options.material.borrow().id();
        let signature = BatchSignature::new(
            options.geometry.id(),
            Some(source_id),
            options.cast_shadow,
            options.receive_shadow,
            false,
        );
        self.insert_batched(
            signature,
            &options.geometry,
            &options.material,
            options.node,
            &options.matrix,
            InstanceAppearance::default(),
            options.entity,
            options.layers,
        )
    }

    /// Insert a primitive into an appearance-extended batch
    pub fn insert_primitive(&mut self, options: PrimitiveOptions) -> InstanceHandle {
        let signature = BatchSignature::new(
            options.geometry.id(),
            options.material.as_ref().map(|material| material.borrow().id()),
            options.cast_shadow,
            options.receive_shadow,
            true,
        );
        let source = match &options.material {
            Some(material) => Rc::clone(material),
            None => self.materials.default_primitive(),
        };
        let appearance = InstanceAppearance {
            color: options.color,
            emissive: options.emissive,
        };
        self.insert_batched(
            signature,
            &options.geometry,
            &source,
            options.node,
            &options.matrix,
            appearance,
            options.entity,
            options.layers,
        )
    }

    fn insert_batched(
        &mut self,
        signature: BatchSignature,
        geometry: &Rc<Geometry>,
        source: &MaterialRef,
        node: NodeId,
        matrix: &Mat4,
        appearance: InstanceAppearance,
        entity: Option<EntityId>,
        layers: Layers,
    ) -> InstanceHandle {
        let batch_count = self.batches.len();
        let batch = match self.batches.entry(signature) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let created = self.materials.create_material(&source.borrow());
                if signature.appearance {
                    created.raw.borrow_mut().add_patch(ShaderPatch::instance_appearance());
                }
                let template = match created.raw.borrow().shading {
                    Shading::Standard => &self.standard_template,
                    Shading::Unlit => &self.unlit_template,
                };
                let program = resolve_program(&mut self.materials, template, &created.raw);
                let mut draw = InstancedDraw::new(
                    Rc::clone(geometry),
                    Rc::clone(&created.raw),
                    signature.cast_shadow,
                    signature.receive_shadow,
                    self.config.batching.initial_capacity,
                    signature.appearance,
                );
                draw.program = program;
                log::info!(
                    "Created batch {:?} ({} batches)",
                    signature,
                    batch_count + 1
                );
                entry.insert(InstanceBatch::new(signature, draw, created.proxy, &self.config.batching))
            }
        };
        let item = batch.create(node, matrix, appearance);
        let material = batch.material().clone();

        let spatial = self.spatial.insert(RenderItem {
            matrix: *matrix,
            geometry: Rc::clone(geometry),
            node,
            entity,
            layers,
        });
        InstanceHandle {
            target: HandleTarget::Batched { signature, item },
            spatial,
            material,
            appearance: signature.appearance,
        }
    }

    /// Insert a mesh with its own draw and a private material
    pub fn insert_single(&mut self, options: MeshOptions) -> InstanceHandle {
        let created = self.materials.create_material(&options.material.borrow());
        let template = match created.raw.borrow().shading {
            Shading::Standard => &self.standard_template,
            Shading::Unlit => &self.unlit_template,
        };
        // Resolved for its side effect of caching the variant
        let _ = resolve_program(&mut self.materials, template, &created.raw);

        let key = self.meshes.insert(MeshDraw {
            geometry: Rc::clone(&options.geometry),
            material: Rc::clone(&created.raw),
            matrix: options.matrix,
            cast_shadow: options.cast_shadow,
            receive_shadow: options.receive_shadow,
        });
        self.draw_list.attach(DrawId::Mesh(key));
        let spatial = self.spatial.insert(RenderItem {
            matrix: options.matrix,
            geometry: options.geometry,
            node: options.node,
            entity: options.entity,
            layers: options.layers,
        });
        InstanceHandle {
            target: HandleTarget::Single(key),
            spatial,
            material: created.proxy,
            appearance: false,
        }
    }

    /// Move an instance; the batch upload happens at the next commit
    pub fn move_instance(&mut self, handle: &InstanceHandle, matrix: &Mat4) -> Result<(), StageError> {
        let moved = match &handle.target {
            HandleTarget::Single(key) => match self.meshes.get_mut(*key) {
                Some(mesh) => {
                    mesh.matrix = *matrix;
                    true
                }
                None => false,
            },
            HandleTarget::Batched { signature, item } => self
                .batches
                .get_mut(signature)
                .is_some_and(|batch| batch.move_item(*item, matrix)),
        };
        if !moved {
            return Err(StageError::UnknownHandle);
        }
        self.spatial.move_item(handle.spatial, matrix);
        Ok(())
    }

    /// Change the raycast layers of an instance
    pub fn set_instance_layers(&mut self, handle: &InstanceHandle, layers: Layers) -> Result<(), StageError> {
        if self.spatial.set_layers(handle.spatial, layers) {
            Ok(())
        } else {
            Err(StageError::UnknownHandle)
        }
    }

    /// Remove an instance from its draw and from the spatial index
    pub fn destroy_instance(&mut self, handle: InstanceHandle) -> Result<(), StageError> {
        let removed = match &handle.target {
            HandleTarget::Single(key) => {
                let removed = self.meshes.remove(*key).is_some();
                self.draw_list.detach(&DrawId::Mesh(*key));
                removed
            }
            HandleTarget::Batched { signature, item } => self
                .batches
                .get_mut(signature)
                .is_some_and(|batch| batch.destroy(*item)),
        };
        self.spatial.remove(handle.spatial);
        if removed {
            Ok(())
        } else {
            Err(StageError::UnknownHandle)
        }
    }

    fn appearance_batch(&mut self, handle: &InstanceHandle) -> Result<(&mut InstanceBatch, crate::render::ItemKey), StageError> {
        if !handle.appearance {
            return Err(StageError::AppearanceUnsupported);
        }
        match &handle.target {
            HandleTarget::Batched { signature, item } => self
                .batches
                .get_mut(signature)
                .map(|batch| (batch, *item))
                .ok_or(StageError::UnknownHandle),
            HandleTarget::Single(_) => Err(StageError::AppearanceUnsupported),
        }
    }

    /// Write a per-instance colour at the instance's current slot
    pub fn set_instance_color(&mut self, handle: &InstanceHandle, color: Color) -> Result<(), StageError> {
        let (batch, item) = self.appearance_batch(handle)?;
        if batch.set_color(item, color) {
            Ok(())
        } else {
            Err(StageError::UnknownHandle)
        }
    }

    /// Write a per-instance emission at the instance's current slot
    pub fn set_instance_emissive(&mut self, handle: &InstanceHandle, emissive: Emissive) -> Result<(), StageError> {
        let (batch, item) = self.appearance_batch(handle)?;
        if batch.set_emissive(item, emissive) {
            Ok(())
        } else {
            Err(StageError::UnknownHandle)
        }
    }

    /// End-of-frame sync of every dirty batch
    pub fn commit_frame(&mut self) {
        for batch in self.batches.values_mut() {
            batch.clean(&mut self.draw_list);
        }
    }

    /// Camera used for screen-space raycasts
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable camera
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Current viewport
    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    /// Set or clear the viewport; a new viewport updates the camera aspect
    pub fn set_viewport(&mut self, viewport: Option<Viewport>) {
        if let Some(viewport) = &viewport {
            self.camera.set_aspect_ratio(viewport.aspect());
        }
        self.viewport = viewport;
    }

    /// Raycast through a screen position
    ///
    /// # Arguments
    /// * `screen` - Pixel position, same space as the viewport rectangle
    /// * `layers` - Layer mask, `None` for every layer
    /// * `near` / `far` - Accepted hit distance window
    ///
    /// # Returns
    /// Hits nearest first; at most one in first-hit mode
    pub fn raycast_pointer(
        &self,
        screen: Vec2,
        layers: Option<Layers>,
        near: f32,
        far: f32,
    ) -> Result<Vec<RaycastHit>, StageError> {
        let viewport = self.viewport.ok_or(StageError::NoViewport)?;
        self.raycast_ndc(viewport.screen_to_ndc(screen), layers, near, far)
    }

    /// Raycast through the viewport center
    pub fn raycast_reticle(&self, layers: Option<Layers>, near: f32, far: f32) -> Result<Vec<RaycastHit>, StageError> {
        if self.viewport.is_none() {
            return Err(StageError::NoViewport);
        }
        self.raycast_ndc(Vec2::zeros(), layers, near, far)
    }

    fn raycast_ndc(&self, ndc: Vec2, layers: Option<Layers>, near: f32, far: f32) -> Result<Vec<RaycastHit>, StageError> {
        let ray = self.camera.ray_from_ndc(ndc).ok_or(StageError::DegenerateCamera)?;
        let query = RaycastQuery::new(ray)
            .with_layers(layers.unwrap_or(Layers::ALL))
            .with_range(near, far)
            .first_hit_only(self.config.raycast.first_hit_only);
        Ok(self.spatial.raycast(&query))
    }

    /// Raycast with an explicit world-space query
    pub fn raycast(&self, query: &RaycastQuery) -> Vec<RaycastHit> {
        self.spatial.raycast(query)
    }

    /// Batch for a signature
    pub fn batch(&self, signature: &BatchSignature) -> Option<&InstanceBatch> {
        self.batches.get(signature)
    }

    /// Batch holding an instance
    pub fn batch_for(&self, handle: &InstanceHandle) -> Option<&InstanceBatch> {
        handle.batch_signature().and_then(|signature| self.batches.get(signature))
    }

    /// Every batch, empty ones included
    pub fn batches(&self) -> impl Iterator<Item = &InstanceBatch> {
        self.batches.values()
    }

    /// Single mesh draw
    pub fn mesh(&self, key: MeshKey) -> Option<&MeshDraw> {
        self.meshes.get(key)
    }

    /// Draws attached this frame
    pub fn draw_list(&self) -> &DrawList {
        &self.draw_list
    }

    /// The spatial index
    pub fn spatial(&self) -> &dyn SpatialIndex {
        self.spatial.as_ref()
    }

    /// Counters over everything currently drawn
    pub fn stats(&self) -> StageStats {
        let mut geometries: HashMap<_, usize> = HashMap::new();
        let mut materials: HashMap<_, usize> = HashMap::new();
        let mut stats = StageStats {
            batches: self.batches.len(),
            draw_calls: self.draw_list.len(),
            single_meshes: self.meshes.len(),
            spatial_items: self.spatial.len(),
            ..StageStats::default()
        };

        let live_batches = self.batches.values().filter(|batch| !batch.is_empty());
        for batch in live_batches {
            stats.instances += batch.len();
            let draw = batch.draw();
            geometries.insert(draw.geometry.id(), draw.geometry.triangle_count());
            let material = draw.material.borrow();
            materials.insert(material.id(), material.texture_bytes());
        }
        for mesh in self.meshes.values() {
            geometries.insert(mesh.geometry.id(), mesh.geometry.triangle_count());
            let material = mesh.material.borrow();
            materials.insert(material.id(), material.texture_bytes());
        }

        stats.geometries = geometries.len();
        stats.triangles = geometries.values().sum();
        stats.materials = materials.len();
        stats.texture_bytes = materials.values().sum();
        stats
    }

    /// Number of distinct batch signatures seen, empty batches included
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Nodes with a live instance in some batch
    pub fn batched_nodes(&self) -> HashSet<NodeId> {
        self.batches
            .values()
            .flat_map(|batch| (0..batch.len()).filter_map(|index| batch.node_at(index)))
            .collect()
    }

    /// Tear down every draw and index entry; outstanding handles go stale
    pub fn destroy(&mut self) {
        for batch in self.batches.values_mut() {
            batch.clear(&mut self.draw_list);
        }
        self.batches.clear();
        self.meshes.clear();
        self.draw_list.clear();
        self.spatial.clear();
        log::info!("Stage destroyed");
    }
}

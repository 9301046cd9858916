//! Materials, the restricted material proxy and the material cache
//!
//! Batches and single meshes never render a shared material directly.
//! [`MaterialCache::create_material`] hands out a private copy, and scripts
//! only reach it through a [`MaterialProxy`] that validates every write.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::color::{Color, ColorError};
use super::shader::{ShaderError, ShaderPatch, ShaderProgram, ShaderTemplate};
use super::texture::Texture;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for materials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

impl MaterialId {
    fn next() -> Self {
        Self(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lighting model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shading {
    /// Physically based lit surface
    Standard,
    /// Flat colour, no lighting
    Unlit,
}

/// Which faces write into shadow maps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowSide {
    /// Front faces
    Front,
    /// Back faces
    Back,
    /// Both faces
    Double,
}

/// Errors raised by the material proxy
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MaterialError {
    /// Colour string rejected
    #[error("[material] color: {0}")]
    Color(#[from] ColorError),

    /// Emissive intensity is NaN or infinite
    #[error("[material] emissiveIntensity must be a finite number, got {0}")]
    EmissiveIntensity(f32),

    /// Texture offset is NaN or infinite
    #[error("[material] texture{axis} must be a finite number, got {value}")]
    TextureOffset {
        /// "X" or "Y"
        axis: &'static str,
        /// Rejected value
        value: f32,
    },
}

/// Properties for building a material from scratch
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialOptions {
    /// Use the unlit shading model
    pub unlit: bool,
    /// Base colour
    pub color: Color,
    /// Metalness, standard shading only
    pub metalness: f32,
    /// Roughness, standard shading only
    pub roughness: f32,
}

impl Default for MaterialOptions {
    fn default() -> Self {
        Self {
            unlit: false,
            color: Color::WHITE,
            metalness: 0.0,
            roughness: 1.0,
        }
    }
}

impl MaterialOptions {
    /// The neutral white material every primitive batch starts from
    pub fn primitive() -> Self {
        Self {
            unlit: false,
            color: Color::WHITE,
            metalness: 0.2,
            roughness: 0.8,
        }
    }

    fn cache_key(&self) -> String {
        format!(
            "{}/{:06x}/{}/{}",
            if self.unlit { "unlit" } else { "standard" },
            self.color.to_hex(),
            self.metalness,
            self.roughness
        )
    }
}

/// Optional texture maps a material samples
#[derive(Debug, Clone, Default)]
pub struct TextureMaps {
    /// Base colour
    pub map: Option<Texture>,
    /// Emission
    pub emissive_map: Option<Texture>,
    /// Tangent-space normals
    pub normal_map: Option<Texture>,
    /// Height bumps
    pub bump_map: Option<Texture>,
    /// Roughness
    pub roughness_map: Option<Texture>,
    /// Metalness
    pub metalness_map: Option<Texture>,
}

impl TextureMaps {
    /// Present maps, in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Texture> {
        [
            &self.map,
            &self.emissive_map,
            &self.normal_map,
            &self.bump_map,
            &self.roughness_map,
            &self.metalness_map,
        ]
        .into_iter()
        .flatten()
    }

    /// Present maps, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Texture> {
        [
            &mut self.map,
            &mut self.emissive_map,
            &mut self.normal_map,
            &mut self.bump_map,
            &mut self.roughness_map,
            &mut self.metalness_map,
        ]
        .into_iter()
        .flatten()
    }
}

/// Surface description consumed by the renderer
#[derive(Debug)]
pub struct Material {
    id: MaterialId,
    /// Optional name for debugging
    pub name: Option<String>,
    /// Lighting model
    pub shading: Shading,
    /// Base colour
    pub color: Color,
    /// Emissive colour
    pub emissive: Color,
    /// Emissive multiplier
    pub emissive_intensity: f32,
    /// Metalness
    pub metalness: f32,
    /// Roughness
    pub roughness: f32,
    /// Whether scene fog applies
    pub fog: bool,
    /// Texture maps
    pub maps: TextureMaps,
    /// Shadow map face culling
    pub shadow_side: ShadowSide,
    /// Shader patches applied when the program is resolved
    pub patches: Vec<ShaderPatch>,
    /// Renderer must re-read this material
    pub needs_update: bool,
}

impl Material {
    /// Build a material from options
    pub fn new(options: &MaterialOptions) -> Self {
        let (shading, metalness, roughness) = if options.unlit {
            (Shading::Unlit, 0.0, 1.0)
        } else {
            (Shading::Standard, options.metalness, options.roughness)
        };
        Self {
            id: MaterialId::next(),
            name: None,
            shading,
            color: options.color,
            emissive: Color::BLACK,
            emissive_intensity: 1.0,
            metalness,
            roughness,
            fog: true,
            maps: TextureMaps::default(),
            shadow_side: ShadowSide::Front,
            patches: Vec::new(),
            needs_update: true,
        }
    }

    /// Set the material name for debugging
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Unique identity
    pub fn id(&self) -> MaterialId {
        self.id
    }

    /// Independent copy: new id, texture maps cloned (pixels shared),
    /// patches carried over
    pub fn duplicate(&self) -> Self {
        Self {
            id: MaterialId::next(),
            name: self.name.clone(),
            shading: self.shading,
            color: self.color,
            emissive: self.emissive,
            emissive_intensity: self.emissive_intensity,
            metalness: self.metalness,
            roughness: self.roughness,
            fog: self.fog,
            maps: self.maps.clone(),
            shadow_side: self.shadow_side,
            patches: self.patches.clone(),
            needs_update: true,
        }
    }

    /// Add a shader patch unless one with the same name is present
    pub fn add_patch(&mut self, patch: ShaderPatch) {
        if !self.patches.iter().any(|p| p.name == patch.name) {
            self.patches.push(patch);
            self.needs_update = true;
        }
    }

    /// Bytes of texture data referenced by this material
    pub fn texture_bytes(&self) -> usize {
        self.maps.iter().map(Texture::byte_size).sum()
    }
}

/// Shared, interior-mutable material
pub type MaterialRef = Rc<RefCell<Material>>;

/// Restricted mutation surface handed to scripts
///
/// Every setter validates before touching the material.
#[derive(Debug, Clone)]
pub struct MaterialProxy {
    material: MaterialRef,
}

impl MaterialProxy {
    /// Wrap a material
    pub fn new(material: MaterialRef) -> Self {
        Self { material }
    }

    /// Identity of the underlying material
    pub fn id(&self) -> MaterialId {
        self.material.borrow().id()
    }

    /// Base colour
    pub fn color(&self) -> Color {
        self.material.borrow().color
    }

    /// Set the base colour from a colour string
    pub fn set_color(&self, value: &str) -> Result<(), MaterialError> {
        let color = Color::parse(value)?;
        let mut material = self.material.borrow_mut();
        material.color = color;
        material.needs_update = true;
        Ok(())
    }

    /// Emissive multiplier
    pub fn emissive_intensity(&self) -> f32 {
        self.material.borrow().emissive_intensity
    }

    /// Set the emissive multiplier
    pub fn set_emissive_intensity(&self, value: f32) -> Result<(), MaterialError> {
        if !value.is_finite() {
            return Err(MaterialError::EmissiveIntensity(value));
        }
        let mut material = self.material.borrow_mut();
        material.emissive_intensity = value;
        material.needs_update = true;
        Ok(())
    }

    /// U offset of the first texture map, if any
    pub fn texture_x(&self) -> Option<f32> {
        self.material.borrow().maps.iter().next().map(|t| t.offset[0])
    }

    /// Set the U offset of every texture map
    pub fn set_texture_x(&self, value: f32) -> Result<(), MaterialError> {
        self.set_offset(0, "X", value)
    }

    /// V offset of the first texture map, if any
    pub fn texture_y(&self) -> Option<f32> {
        self.material.borrow().maps.iter().next().map(|t| t.offset[1])
    }

    /// Set the V offset of every texture map
    pub fn set_texture_y(&self, value: f32) -> Result<(), MaterialError> {
        self.set_offset(1, "Y", value)
    }

    fn set_offset(&self, axis: usize, name: &'static str, value: f32) -> Result<(), MaterialError> {
        if !value.is_finite() {
            return Err(MaterialError::TextureOffset { axis: name, value });
        }
        let mut material = self.material.borrow_mut();
        for texture in material.maps.iter_mut() {
            texture.offset[axis] = value;
        }
        material.needs_update = true;
        Ok(())
    }

    /// Whether scene fog applies
    pub fn fog(&self) -> bool {
        self.material.borrow().fog
    }

    /// Enable or disable fog
    pub fn set_fog(&self, value: bool) {
        let mut material = self.material.borrow_mut();
        material.fog = value;
        material.needs_update = true;
    }
}

/// A private material plus the proxy guarding it
#[derive(Debug, Clone)]
pub struct CreatedMaterial {
    /// Material handed to the renderer
    pub raw: MaterialRef,
    /// Script-facing surface
    pub proxy: MaterialProxy,
}

/// Per-stage material deduplication and shader program cache
#[derive(Debug, Default)]
pub struct MaterialCache {
    /// Cache storage: composite property key -> material
    shared: HashMap<String, MaterialRef>,
    /// Resolved programs keyed by template and ordered patch names
    programs: HashMap<(String, Vec<String>), Rc<ShaderProgram>>,
    created: usize,
}

impl MaterialCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared material for `options`, created on first request
    ///
    /// Shared materials are sources only; they are never rendered directly,
    /// so they are never mutated after creation.
    pub fn shared(&mut self, options: &MaterialOptions) -> MaterialRef {
        let key = options.cache_key();
        Rc::clone(self.shared.entry(key).or_insert_with(|| {
            log::debug!("Creating shared material {:?}", options);
            Rc::new(RefCell::new(Material::new(options)))
        }))
    }

    /// The neutral white material used by primitive batches
    pub fn default_primitive(&mut self) -> MaterialRef {
        self.shared(&MaterialOptions::primitive())
    }

    /// Private copy of `source` with a validating proxy
    ///
    /// # Arguments
    /// * `source` - Material to copy; it is never referenced afterwards
    ///
    /// # Returns
    /// The copy (new id, cloned texture maps, back-face shadows) and its proxy
    pub fn create_material(&mut self, source: &Material) -> CreatedMaterial {
        let mut raw = source.duplicate();
        raw.shadow_side = ShadowSide::Back;
        self.created += 1;
        let raw = Rc::new(RefCell::new(raw));
        CreatedMaterial {
            proxy: MaterialProxy::new(Rc::clone(&raw)),
            raw,
        }
    }

    /// Build a private material straight from options
    pub fn create_from_options(&mut self, options: &MaterialOptions) -> CreatedMaterial {
        self.create_material(&Material::new(options))
    }

    /// Number of private materials handed out
    pub fn created_count(&self) -> usize {
        self.created
    }

    /// Resolve the shader program for a material variant, once per variant
    pub fn program(&mut self, material: &Material, template: &ShaderTemplate) -> Result<Rc<ShaderProgram>, ShaderError> {
        let patches: Vec<String> = material.patches.iter().map(|p| p.name.clone()).collect();
        let key = (template.name().to_string(), patches);
        if let Some(program) = self.programs.get(&key) {
            return Ok(Rc::clone(program));
        }

        let source = template.apply(&material.patches)?;
        let program = Rc::new(ShaderProgram {
            template: key.0.clone(),
            patches: key.1.clone(),
            source,
        });
        log::debug!("Resolved shader program {}{:?}", key.0, key.1);
        self.programs.insert(key, Rc::clone(&program));
        Ok(program)
    }

    /// Number of distinct programs resolved
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }
}

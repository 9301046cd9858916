//! Render-side resources of the stage
//!
//! Shared geometry and materials, per-instance buffers, the batches that
//! own instanced draws, and the draw list a renderer walks each frame.

pub mod batch;
pub mod buffer;
pub mod camera;
pub mod color;
pub mod draw;
pub mod geometry;
pub mod material;
pub mod shader;
pub mod texture;

pub use batch::{BatchSignature, InstanceAppearance, InstanceBatch, ItemKey};
pub use buffer::InstanceBuffer;
pub use camera::{Camera, Viewport};
pub use color::{Color, ColorError, Emissive};
pub use draw::{DrawId, DrawList, InstancedDraw, MeshDraw, MeshKey};
pub use geometry::{Geometry, GeometryCache, GeometryId, PrimitiveKind};
pub use material::{
    CreatedMaterial, Material, MaterialCache, MaterialError, MaterialId, MaterialOptions, MaterialProxy,
    MaterialRef, Shading, ShadowSide,
};
pub use shader::{InjectionPoint, ShaderError, ShaderPatch, ShaderProgram, ShaderSource, ShaderTemplate};
pub use texture::Texture;

//! Draw records handed to the renderer
//!
//! An [`InstancedDraw`] is one GPU draw call covering every instance of a
//! batch; a [`MeshDraw`] is a single non-instanced mesh. The [`DrawList`]
//! holds the ids of every attached draw in attachment order.

use std::rc::Rc;

use super::batch::BatchSignature;
use super::buffer::InstanceBuffer;
use super::color::{Color, Emissive};
use super::geometry::Geometry;
use super::material::MaterialRef;
use super::shader::ShaderProgram;
use crate::foundation::math::{Mat4, Mat4Ext};

slotmap::new_key_type! {
    /// Identity of a single (non-instanced) mesh draw
    pub struct MeshKey;
}

/// Column-major identity transform, the neutral transform slot
pub const IDENTITY_SLOT: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Neutral colour slot: white
pub const NEUTRAL_COLOR_SLOT: [f32; 3] = [1.0, 1.0, 1.0];

/// Neutral emissive slot: no emission
pub const NEUTRAL_EMISSIVE_SLOT: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

/// One instanced draw call
#[derive(Debug)]
pub struct InstancedDraw {
    /// Shared geometry
    pub geometry: Rc<Geometry>,
    /// Private material of the owning batch
    pub material: MaterialRef,
    /// Resolved shader program, `None` when resolution fell back
    pub program: Option<Rc<ShaderProgram>>,
    /// Writes into shadow maps
    pub cast_shadow: bool,
    /// Samples shadow maps
    pub receive_shadow: bool,
    /// 16 floats per slot
    pub transforms: InstanceBuffer,
    /// 3 floats per slot, appearance-extended batches only
    pub colors: Option<InstanceBuffer>,
    /// 4 floats per slot (rgb + intensity), appearance-extended batches only
    pub emissives: Option<InstanceBuffer>,
    /// Number of instances the renderer draws
    pub count: usize,
}

impl InstancedDraw {
    /// Allocate buffers of `capacity` neutral slots
    pub fn new(
        geometry: Rc<Geometry>,
        material: MaterialRef,
        cast_shadow: bool,
        receive_shadow: bool,
        capacity: usize,
        appearance: bool,
    ) -> Self {
        Self {
            geometry,
            material,
            program: None,
            cast_shadow,
            receive_shadow,
            transforms: InstanceBuffer::new(16, capacity, &IDENTITY_SLOT),
            colors: appearance.then(|| InstanceBuffer::new(3, capacity, &NEUTRAL_COLOR_SLOT)),
            emissives: appearance.then(|| InstanceBuffer::new(4, capacity, &NEUTRAL_EMISSIVE_SLOT)),
            count: 0,
        }
    }

    /// Slots allocated
    pub fn capacity(&self) -> usize {
        self.transforms.capacity()
    }

    /// Write a transform into slot `index`
    pub fn set_matrix_at(&mut self, index: usize, matrix: &Mat4) {
        self.transforms.write(index, &matrix.to_cols_array());
    }

    /// Transform stored in slot `index`
    pub fn matrix_at(&self, index: usize) -> Option<Mat4> {
        self.transforms.read(index).map(Mat4::from_column_slice)
    }

    /// Write a colour into slot `index`; no-op without a colour buffer
    pub fn set_color_at(&mut self, index: usize, color: Color) {
        if let Some(colors) = &mut self.colors {
            colors.write(index, &color.to_array());
        }
    }

    /// Colour stored in slot `index`
    pub fn color_at(&self, index: usize) -> Option<Color> {
        let slot = self.colors.as_ref()?.read(index)?;
        Some(Color::new(slot[0], slot[1], slot[2]))
    }

    /// Write an emission into slot `index`; no-op without an emissive buffer
    pub fn set_emissive_at(&mut self, index: usize, emissive: Emissive) {
        if let Some(emissives) = &mut self.emissives {
            emissives.write(index, &emissive.to_array());
        }
    }

    /// Emission stored in slot `index`
    pub fn emissive_at(&self, index: usize) -> Option<Emissive> {
        let slot = self.emissives.as_ref()?.read(index)?;
        Some(Emissive::with_intensity(Color::new(slot[0], slot[1], slot[2]), slot[3]))
    }

    /// Grow every buffer to `capacity`, new slots neutral
    pub fn resize(&mut self, capacity: usize) {
        self.transforms.grow(capacity, &IDENTITY_SLOT);
        if let Some(colors) = &mut self.colors {
            colors.grow(capacity, &NEUTRAL_COLOR_SLOT);
        }
        if let Some(emissives) = &mut self.emissives {
            emissives.grow(capacity, &NEUTRAL_EMISSIVE_SLOT);
        }
    }

    /// Flag every buffer for upload
    pub fn mark_for_upload(&mut self) {
        self.transforms.needs_upload = true;
        for buffer in [&mut self.colors, &mut self.emissives].into_iter().flatten() {
            buffer.needs_upload = true;
        }
    }
}

/// One non-instanced mesh
#[derive(Debug)]
pub struct MeshDraw {
    /// Geometry
    pub geometry: Rc<Geometry>,
    /// Private material
    pub material: MaterialRef,
    /// World transform
    pub matrix: Mat4,
    /// Writes into shadow maps
    pub cast_shadow: bool,
    /// Samples shadow maps
    pub receive_shadow: bool,
}

/// Identity of an attached draw
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DrawId {
    /// The instanced draw of a batch
    Batch(BatchSignature),
    /// A single mesh
    Mesh(MeshKey),
}

/// Draws currently attached to the scene, in attachment order
#[derive(Debug, Default)]
pub struct DrawList {
    draws: Vec<DrawId>,
}

impl DrawList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a draw; attaching twice is a no-op
    pub fn attach(&mut self, id: DrawId) {
        if !self.contains(&id) {
            self.draws.push(id);
        }
    }

    /// Detach a draw, returning whether it was attached
    pub fn detach(&mut self, id: &DrawId) -> bool {
        let before = self.draws.len();
        self.draws.retain(|draw| draw != id);
        self.draws.len() != before
    }

    /// Whether `id` is attached
    pub fn contains(&self, id: &DrawId) -> bool {
        self.draws.contains(id)
    }

    /// Draw-call count
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    /// True when nothing is attached
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Attached draws in order
    pub fn iter(&self) -> impl Iterator<Item = &DrawId> {
        self.draws.iter()
    }

    /// Detach everything
    pub fn clear(&mut self) {
        self.draws.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::geometry::PrimitiveKind;
    use crate::render::material::{Material, MaterialOptions};
    use std::cell::RefCell;

    fn draw(appearance: bool) -> InstancedDraw {
        InstancedDraw::new(
            Rc::new(Geometry::primitive(PrimitiveKind::Box)),
            Rc::new(RefCell::new(Material::new(&MaterialOptions::default()))),
            true,
            true,
            2,
            appearance,
        )
    }

    #[test]
    fn test_slots_roundtrip_and_neutral_growth() {
        let mut draw = draw(true);
        let matrix = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        draw.set_matrix_at(1, &matrix);
        draw.set_color_at(1, Color::new(1.0, 0.0, 0.0));
        draw.resize(4);

        assert_eq!(draw.capacity(), 4);
        assert_eq!(draw.matrix_at(1).unwrap(), matrix);
        assert_eq!(draw.matrix_at(3).unwrap(), Mat4::identity());
        assert_eq!(draw.color_at(1).unwrap(), Color::new(1.0, 0.0, 0.0));
        assert_eq!(draw.color_at(3).unwrap(), Color::WHITE);
        assert_eq!(draw.emissive_at(3).unwrap(), Emissive::NONE);
    }

    #[test]
    fn test_plain_draw_has_no_appearance_buffers() {
        let mut draw = draw(false);
        draw.set_color_at(0, Color::BLACK);
        assert!(draw.color_at(0).is_none());
        assert!(draw.emissives.is_none());
    }

    #[test]
    fn test_draw_list_attach_detach() {
        let mut list = DrawList::new();
        let id = DrawId::Mesh(MeshKey::default());
        list.attach(id.clone());
        list.attach(id.clone());
        assert_eq!(list.len(), 1);
        assert!(list.detach(&id));
        assert!(!list.detach(&id));
        assert!(list.is_empty());
    }
}

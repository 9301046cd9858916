//! Instance batches
//!
//! An [`InstanceBatch`] owns the single instanced draw shared by every
//! render item with the same [`BatchSignature`]. Items are stored densely:
//! slot `i` of every instance buffer belongs to `items[i]`. Removal swaps
//! the tail item into the hole, so callers never hold raw indices; they
//! hold an [`ItemKey`] whose slot-tracking cell is updated on every swap.

use slotmap::SlotMap;

use super::color::{Color, Emissive};
use super::draw::{DrawId, DrawList, InstancedDraw, NEUTRAL_COLOR_SLOT, NEUTRAL_EMISSIVE_SLOT};
use super::geometry::GeometryId;
use super::material::{MaterialId, MaterialProxy};
use crate::config::BatchConfig;
use crate::foundation::math::Mat4;
use crate::scene::NodeId;

slotmap::new_key_type! {
    /// Slot-tracking cell of one batched item
    pub struct ItemKey;
}

/// Everything that decides which batch an item joins
///
/// Equal signatures always share one batch; any difference separates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchSignature {
    /// Shared geometry
    pub geometry: GeometryId,
    /// Source material, `None` for the default primitive material
    pub material: Option<MaterialId>,
    /// Writes into shadow maps
    pub cast_shadow: bool,
    /// Samples shadow maps
    pub receive_shadow: bool,
    /// Carries per-instance colour and emissive buffers
    pub appearance: bool,
}

impl BatchSignature {
    /// Build a signature from its parts
    pub fn new(
        geometry: GeometryId,
        material: Option<MaterialId>,
        cast_shadow: bool,
        receive_shadow: bool,
        appearance: bool,
    ) -> Self {
        Self {
            geometry,
            material,
            cast_shadow,
            receive_shadow,
            appearance,
        }
    }
}

/// Per-instance appearance supplied at creation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstanceAppearance {
    /// Colour multiplied into the albedo
    pub color: Option<Color>,
    /// Emission added to the emissive radiance
    pub emissive: Option<Emissive>,
}

#[derive(Debug, Clone)]
struct BatchItem {
    key: ItemKey,
    node: NodeId,
    matrix: Mat4,
    color: Option<Color>,
    emissive: Option<Emissive>,
}

/// One instanced draw and the dense list of items feeding it
#[derive(Debug)]
pub struct InstanceBatch {
    signature: BatchSignature,
    draw: InstancedDraw,
    proxy: MaterialProxy,
    /// Item key -> current dense index
    slots: SlotMap<ItemKey, usize>,
    items: Vec<BatchItem>,
    dirty: bool,
    attached: bool,
    growth_headroom: usize,
}

impl InstanceBatch {
    /// Wrap a freshly allocated draw
    pub fn new(signature: BatchSignature, draw: InstancedDraw, proxy: MaterialProxy, config: &BatchConfig) -> Self {
        Self {
            signature,
            draw,
            proxy,
            slots: SlotMap::with_key(),
            items: Vec::new(),
            dirty: true,
            attached: false,
            growth_headroom: config.growth_headroom.max(1),
        }
    }

    /// Signature this batch serves
    pub fn signature(&self) -> &BatchSignature {
        &self.signature
    }

    /// Proxy over the batch's private material
    pub fn material(&self) -> &MaterialProxy {
        &self.proxy
    }

    /// The instanced draw
    pub fn draw(&self) -> &InstancedDraw {
        &self.draw
    }

    /// Append an item at the tail
    ///
    /// The slot write is dropped if the buffers are full; [`clean`] grows
    /// them and rewrites every slot past the old capacity.
    ///
    /// [`clean`]: InstanceBatch::clean
    pub fn create(&mut self, node: NodeId, matrix: &Mat4, appearance: InstanceAppearance) -> ItemKey {
        let index = self.items.len();
        let key = self.slots.insert(index);
        self.items.push(BatchItem {
            key,
            node,
            matrix: *matrix,
            color: appearance.color,
            emissive: appearance.emissive,
        });
        self.write_slot(index);
        self.dirty = true;
        log::trace!("Batch {:?} create at {}", self.signature.geometry, index);
        key
    }

    /// Replace an item's transform; upload is deferred to [`clean`](InstanceBatch::clean)
    pub fn move_item(&mut self, key: ItemKey, matrix: &Mat4) -> bool {
        let Some(&index) = self.slots.get(key) else {
            return false;
        };
        self.items[index].matrix = *matrix;
        self.draw.set_matrix_at(index, matrix);
        self.dirty = true;
        true
    }

    /// Remove an item by swapping the tail item into its slot
    pub fn destroy(&mut self, key: ItemKey) -> bool {
        let Some(index) = self.slots.remove(key) else {
            return false;
        };
        let last = self.items.len() - 1;
        self.items.swap_remove(index);
        if index != last {
            let moved = self.items[index].key;
            if let Some(slot) = self.slots.get_mut(moved) {
                *slot = index;
            }
            self.write_slot(index);
        }
        self.dirty = true;
        log::trace!("Batch {:?} destroy at {} ({} left)", self.signature.geometry, index, self.items.len());
        true
    }

    /// Set an item's colour in place
    pub fn set_color(&mut self, key: ItemKey, color: Color) -> bool {
        let Some(&index) = self.slots.get(key) else {
            return false;
        };
        self.items[index].color = Some(color);
        self.draw.set_color_at(index, color);
        self.dirty = true;
        true
    }

    /// Set an item's emission in place
    pub fn set_emissive(&mut self, key: ItemKey, emissive: Emissive) -> bool {
        let Some(&index) = self.slots.get(key) else {
            return false;
        };
        self.items[index].emissive = Some(emissive);
        self.draw.set_emissive_at(index, emissive);
        self.dirty = true;
        true
    }

    /// Per-frame sync: grow buffers, update the instance count, flag
    /// uploads and attach or detach the draw
    ///
    /// Does nothing unless something changed since the last call.
    pub fn clean(&mut self, draw_list: &mut DrawList) {
        if !self.dirty {
            return;
        }
        let count = self.items.len();
        let old_capacity = self.draw.capacity();
        if old_capacity < count {
            let mut capacity = old_capacity;
            while capacity < count {
                capacity += self.growth_headroom;
            }
            log::debug!(
                "Growing batch {:?} from {} to {} slots",
                self.signature.geometry,
                old_capacity,
                capacity
            );
            self.draw.resize(capacity);
            for index in old_capacity..count {
                self.write_slot(index);
            }
        }

        self.draw.count = count;
        let id = DrawId::Batch(self.signature);
        if count == 0 {
            if self.attached {
                draw_list.detach(&id);
                self.attached = false;
                log::debug!("Detached empty batch {:?}", self.signature.geometry);
            }
            self.dirty = false;
            return;
        }
        if !self.attached {
            draw_list.attach(id);
            self.attached = true;
            log::debug!("Attached batch {:?}", self.signature.geometry);
        }
        self.draw.mark_for_upload();
        self.dirty = false;
    }

    /// Copy an item's full record into its slot; absent appearance writes
    /// the neutral value so a slot never keeps a previous owner's look
    fn write_slot(&mut self, index: usize) {
        let item = &self.items[index];
        let (matrix, color, emissive) = (item.matrix, item.color, item.emissive);
        self.draw.set_matrix_at(index, &matrix);
        if let Some(colors) = &mut self.draw.colors {
            match color {
                Some(color) => colors.write(index, &color.to_array()),
                None => colors.write(index, &NEUTRAL_COLOR_SLOT),
            }
        }
        if let Some(emissives) = &mut self.draw.emissives {
            match emissive {
                Some(emissive) => emissives.write(index, &emissive.to_array()),
                None => emissives.write(index, &NEUTRAL_EMISSIVE_SLOT),
            }
        }
    }

    /// Live items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True without live items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Slots allocated in the instance buffers
    pub fn capacity(&self) -> usize {
        self.draw.capacity()
    }

    /// Instance count the renderer draws, as of the last clean
    pub fn instance_count(&self) -> usize {
        self.draw.count
    }

    /// Whether the draw is in the draw list
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Whether a clean is pending
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Current dense index of an item
    pub fn index_of(&self, key: ItemKey) -> Option<usize> {
        self.slots.get(key).copied()
    }

    /// Node owning the item at `index`
    pub fn node_at(&self, index: usize) -> Option<NodeId> {
        self.items.get(index).map(|item| item.node)
    }

    /// Every item's tracking cell points at its own position and no cell
    /// points past the end
    pub fn check_density(&self) -> bool {
        self.slots.len() == self.items.len()
            && self
                .items
                .iter()
                .enumerate()
                .all(|(index, item)| self.slots.get(item.key) == Some(&index))
    }

    /// Detach and forget every item
    pub fn clear(&mut self, draw_list: &mut DrawList) {
        self.items.clear();
        self.slots.clear();
        self.dirty = true;
        self.clean(draw_list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::geometry::{Geometry, PrimitiveKind};
    use crate::render::material::{Material, MaterialOptions};
    use slotmap::KeyData;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn node(n: u64) -> NodeId {
        NodeId::from(KeyData::from_ffi(n))
    }

    fn batch(appearance: bool) -> InstanceBatch {
        let geometry = Rc::new(Geometry::primitive(PrimitiveKind::Box));
        let material = Rc::new(RefCell::new(Material::new(&MaterialOptions::primitive())));
        let signature = BatchSignature::new(geometry.id(), None, true, true, appearance);
        let config = BatchConfig::default();
        let draw = InstancedDraw::new(
            geometry,
            Rc::clone(&material),
            true,
            true,
            config.initial_capacity,
            appearance,
        );
        InstanceBatch::new(signature, draw, MaterialProxy::new(material), &config)
    }

    fn at(x: f32) -> Mat4 {
        Mat4::new_translation(&Vec3::new(x, 0.0, 0.0))
    }

    fn colored(hex: &str) -> InstanceAppearance {
        InstanceAppearance {
            color: Some(Color::parse(hex).unwrap()),
            emissive: None,
        }
    }

    #[test]
    fn test_swap_compaction_keeps_density() {
        let mut batch = batch(false);
        let mut list = DrawList::new();
        let mut keys = Vec::new();
        let mut seed: u64 = 7;
        for step in 0..400 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            if keys.is_empty() || (seed >> 33) % 3 != 0 {
                keys.push(batch.create(node(step + 1), &at(step as f32), InstanceAppearance::default()));
            } else {
                let victim = keys.swap_remove(((seed >> 33) as usize) % keys.len());
                assert!(batch.destroy(victim));
            }
            assert!(batch.check_density());
            assert_eq!(batch.len(), keys.len());
        }
        batch.clean(&mut list);
        assert_eq!(batch.instance_count(), keys.len());
        for key in &keys {
            let index = batch.index_of(*key).unwrap();
            assert_eq!(batch.draw().matrix_at(index).unwrap(), batch.items[index].matrix);
        }
    }

    #[test]
    fn test_destroy_only_item_detaches_and_create_reattaches() {
        let mut batch = batch(false);
        let mut list = DrawList::new();
        let key = batch.create(node(1), &at(0.0), InstanceAppearance::default());
        batch.clean(&mut list);
        assert!(batch.is_attached());
        assert_eq!(list.len(), 1);

        batch.destroy(key);
        batch.clean(&mut list);
        assert!(!batch.is_attached());
        assert!(list.is_empty());
        assert_eq!(batch.instance_count(), 0);

        batch.create(node(2), &at(1.0), InstanceAppearance::default());
        batch.clean(&mut list);
        assert!(batch.is_attached());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_growth_uses_fixed_headroom_and_preserves_slots() {
        let mut batch = batch(true);
        let mut list = DrawList::new();
        let mut keys = Vec::new();
        let mut capacities = vec![batch.capacity()];
        for i in 0..150 {
            let appearance = InstanceAppearance {
                color: Some(Color::new(i as f32 / 150.0, 0.5, 0.25)),
                emissive: (i % 2 == 0).then(|| Emissive::with_intensity(Color::new(0.0, 1.0, 0.0), i as f32)),
            };
            keys.push(batch.create(node(i + 1), &at(i as f32), appearance));
            batch.clean(&mut list);
            if capacities.last() != Some(&batch.capacity()) {
                capacities.push(batch.capacity());
            }
            if keys.len() > 110 {
                assert_eq!(batch.index_of(keys[109]), Some(109));
            }
        }
        assert_eq!(capacities, vec![10, 110, 210]);

        for (i, key) in keys.iter().enumerate() {
            let index = batch.index_of(*key).unwrap();
            assert_eq!(index, i);
            assert_eq!(batch.draw().matrix_at(index).unwrap(), at(i as f32));
            assert_eq!(batch.draw().color_at(index).unwrap(), Color::new(i as f32 / 150.0, 0.5, 0.25));
            let emissive = batch.draw().emissive_at(index).unwrap();
            if i % 2 == 0 {
                assert_eq!(emissive.intensity, i as f32);
            } else {
                assert_eq!(emissive, Emissive::NONE);
            }
        }
        assert_eq!(batch.draw().color_at(200).unwrap(), Color::WHITE);
    }

    #[test]
    fn test_bulk_insert_before_clean_grows_once() {
        let mut batch = batch(true);
        let mut list = DrawList::new();
        for i in 0..150 {
            batch.create(node(i + 1), &at(i as f32), colored("#ff0000"));
        }
        batch.clean(&mut list);
        assert_eq!(batch.capacity(), 210);
        assert_eq!(batch.draw().color_at(149).unwrap(), Color::new(1.0, 0.0, 0.0));
        assert_eq!(batch.draw().matrix_at(149).unwrap(), at(149.0));
    }

    #[test]
    fn test_scenario_three_colours_destroy_middle() {
        let mut batch = batch(true);
        let mut list = DrawList::new();
        let _red = batch.create(node(1), &at(0.0), colored("#ff0000"));
        let green = batch.create(node(2), &at(1.0), colored("#00ff00"));
        let blue = batch.create(node(3), &at(2.0), colored("#0000ff"));
        batch.clean(&mut list);
        assert_eq!(batch.instance_count(), 3);

        batch.destroy(green);
        batch.clean(&mut list);
        assert_eq!(batch.instance_count(), 2);
        assert_eq!(batch.draw().color_at(0).unwrap().to_hex(), 0xff0000);
        assert_eq!(batch.draw().color_at(1).unwrap().to_hex(), 0x0000ff);
        assert_eq!(batch.index_of(blue), Some(1));
        assert_eq!(batch.node_at(1), Some(node(3)));
    }

    #[test]
    fn test_swapped_in_item_without_colour_writes_neutral() {
        let mut batch = batch(true);
        let red = batch.create(node(1), &at(0.0), colored("#ff0000"));
        batch.create(node(2), &at(1.0), InstanceAppearance::default());
        batch.destroy(red);
        assert_eq!(batch.draw().color_at(0).unwrap(), Color::WHITE);
        assert_eq!(batch.draw().emissive_at(0).unwrap(), Emissive::NONE);
    }

    #[test]
    fn test_set_color_follows_compaction() {
        let mut batch = batch(true);
        let first = batch.create(node(1), &at(0.0), InstanceAppearance::default());
        let second = batch.create(node(2), &at(1.0), InstanceAppearance::default());
        batch.destroy(first);
        assert!(batch.set_color(second, Color::new(0.0, 0.0, 1.0)));
        assert!(batch.set_emissive(second, Emissive::new(Color::WHITE)));
        assert_eq!(batch.draw().color_at(0).unwrap(), Color::new(0.0, 0.0, 1.0));
        assert_eq!(batch.draw().emissive_at(0).unwrap().intensity, 1.0);
        assert!(!batch.set_color(first, Color::BLACK));
        assert!(!batch.destroy(first));
    }

    #[test]
    fn test_clean_is_noop_when_not_dirty() {
        let mut batch = batch(false);
        let mut list = DrawList::new();
        batch.create(node(1), &at(0.0), InstanceAppearance::default());
        batch.clean(&mut list);
        batch.draw.transforms.needs_upload = false;
        batch.clean(&mut list);
        assert!(!batch.draw().transforms.needs_upload);
        let key = batch.create(node(2), &at(1.0), InstanceAppearance::default());
        batch.move_item(key, &at(5.0));
        batch.clean(&mut list);
        assert!(batch.draw().transforms.needs_upload);
        assert_eq!(batch.draw().matrix_at(1).unwrap(), at(5.0));
    }
}

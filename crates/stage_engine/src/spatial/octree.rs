//! Loose octree spatial index
//!
//! Divides space into cubic cells whose query bounds are twice their
//! nominal size. An item lives in the smallest cell whose nominal bounds
//! contain its bounding-sphere center and whose half size covers its
//! radius, so items never straddle cells. Each entry remembers its cell,
//! which makes the common move (still fits) a constant-time update.

use slotmap::SlotMap;

use super::{
    Aabb, BoundingSphere, Layers, RaycastHit, RaycastQuery, RenderItem, SpatialIndex, SpatialKey,
};
use crate::config::SpatialConfig;
use crate::foundation::math::{Mat4, Vec3};

/// Single cell in the octree hierarchy
#[derive(Debug, Clone)]
struct Cell {
    center: Vec3,
    /// Nominal edge length
    size: f32,
    parent: Option<usize>,
    /// Child cells, created lazily per octant
    children: [Option<usize>; 8],
    entries: Vec<SpatialKey>,
}

impl Cell {
    fn new(center: Vec3, size: f32, parent: Option<usize>) -> Self {
        Self {
            center,
            size,
            parent,
            children: [None; 8],
            entries: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    /// Query bounds: the nominal cell grown by half its size on every side
    fn loose_bounds(&self) -> Aabb {
        Aabb::from_center_extents(self.center, Vec3::repeat(self.size))
    }

    fn fits(&self, sphere: &BoundingSphere) -> bool {
        let half = self.size * 0.5;
        sphere.radius <= half
            && (sphere.center - self.center).iter().all(|d| d.abs() <= half)
    }
}

/// Octant index (0-7) of `point` relative to `center`
///
/// Bit 0 is +X, bit 1 is +Y, bit 2 is +Z.
fn octant_of(center: &Vec3, point: &Vec3) -> usize {
    usize::from(point.x >= center.x)
        | usize::from(point.y >= center.y) << 1
        | usize::from(point.z >= center.z) << 2
}

fn is_finite(v: &Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

fn octant_sign(octant: usize) -> Vec3 {
    let sign = |bit: usize| if octant & bit != 0 { 1.0 } else { -1.0 };
    Vec3::new(sign(1), sign(2), sign(4))
}

#[derive(Debug, Clone)]
struct Entry {
    item: RenderItem,
    /// World bounding sphere derived from the item matrix
    sphere: BoundingSphere,
    cell: usize,
}

/// Loose octree implementing [`SpatialIndex`]
#[derive(Debug, Clone)]
pub struct LooseOctree {
    cells: Vec<Cell>,
    free_cells: Vec<usize>,
    root: usize,
    entries: SlotMap<SpatialKey, Entry>,
    min_node_size: f32,
}

impl LooseOctree {
    /// Create an empty octree with the given root cell
    pub fn new(config: &SpatialConfig) -> Self {
        let center = Vec3::from(config.center);
        Self {
            cells: vec![Cell::new(center, config.size, None)],
            free_cells: Vec::new(),
            root: 0,
            entries: SlotMap::with_key(),
            min_node_size: config.min_node_size,
        }
    }

    /// Number of live cells, root included
    pub fn cell_count(&self) -> usize {
        self.cells.len() - self.free_cells.len()
    }

    /// Nominal edge length of the root cell
    pub fn root_size(&self) -> f32 {
        self.cells[self.root].size
    }

    /// Nominal edge length of the cell holding `key`
    pub fn cell_size_of(&self, key: SpatialKey) -> Option<f32> {
        self.entries.get(key).map(|entry| self.cells[entry.cell].size)
    }

    fn alloc_cell(&mut self, cell: Cell) -> usize {
        match self.free_cells.pop() {
            Some(index) => {
                self.cells[index] = cell;
                index
            }
            None => {
                self.cells.push(cell);
                self.cells.len() - 1
            }
        }
    }

    /// Double the root toward `sphere` until it fits
    ///
    /// Returns false when the root would stop being finite before it fits.
    fn grow_root_to_fit(&mut self, sphere: &BoundingSphere) -> bool {
        while !self.cells[self.root].fits(sphere) {
            let old = self.root;
            let (old_center, old_size) = (self.cells[old].center, self.cells[old].size);
            let toward = octant_sign(octant_of(&old_center, &sphere.center));
            let new_center = old_center + toward * (old_size * 0.5);
            let new_size = old_size * 2.0;
            if !new_size.is_finite() || !is_finite(&new_center) {
                return false;
            }
            let new_root = self.alloc_cell(Cell::new(new_center, new_size, None));

            let old_is_empty = self.cells[old].entries.is_empty() && self.cells[old].is_leaf();
            if old_is_empty {
                self.free_cells.push(old);
            } else {
                let slot = octant_of(&new_center, &old_center);
                self.cells[new_root].children[slot] = Some(old);
                self.cells[old].parent = Some(new_root);
            }
            self.root = new_root;
            log::debug!("Octree root grew to size {} centered at {:?}", new_size, new_center);
        }
        true
    }

    /// Smallest existing-or-created cell under the root that fits `sphere`
    fn descend(&mut self, sphere: &BoundingSphere) -> usize {
        let mut current = self.root;
        loop {
            let cell = &self.cells[current];
            let child_size = cell.size * 0.5;
            if !child_size.is_finite() || child_size < self.min_node_size || sphere.radius > child_size * 0.5 {
                return current;
            }
            let octant = octant_of(&cell.center, &sphere.center);
            let existing = cell.children[octant];
            current = match existing {
                Some(child) => child,
                None => {
                    let center = cell.center + octant_sign(octant) * (cell.size * 0.25);
                    if !is_finite(&center) {
                        return current;
                    }
                    let child = self.alloc_cell(Cell::new(center, child_size, Some(current)));
                    self.cells[current].children[octant] = Some(child);
                    child
                }
            };
        }
    }

    fn place(&mut self, key: SpatialKey, sphere: &BoundingSphere) -> usize {
        // Bounds the root cannot grow to cover are parked at the root
        let reachable = is_finite(&sphere.center) && sphere.radius.is_finite() && self.grow_root_to_fit(sphere);
        let cell = if reachable {
            self.descend(sphere)
        } else {
            log::warn!("Spatial item {:?} is out of octree range, keeping it at the root", key);
            self.root
        };
        self.cells[cell].entries.push(key);
        cell
    }

    fn unlink(&mut self, key: SpatialKey, cell: usize) {
        let entries = &mut self.cells[cell].entries;
        if let Some(position) = entries.iter().position(|k| *k == key) {
            entries.swap_remove(position);
        }
        self.prune(cell);
    }

    /// Free empty leaf cells from `cell` upward
    fn prune(&mut self, mut cell: usize) {
        while cell != self.root {
            let node = &self.cells[cell];
            if !node.entries.is_empty() || !node.is_leaf() {
                return;
            }
            let Some(parent) = node.parent else { return };
            for slot in &mut self.cells[parent].children {
                if *slot == Some(cell) {
                    *slot = None;
                }
            }
            self.free_cells.push(cell);
            cell = parent;
        }
    }

    fn visit(&self, cell: usize, query: &RaycastQuery, hits: &mut Vec<RaycastHit>) {
        let node = &self.cells[cell];
        match node.loose_bounds().intersect_ray(&query.ray) {
            // Parked root entries may lie outside the root bounds
            None if cell == self.root => {
                self.visit_entries(&node.entries, query, hits);
                return;
            }
            None => return,
            Some((enter, _)) if enter > query.far || (query.first_hit_only && enter > best_distance(hits)) => {
                return;
            }
            Some(_) => {}
        }

        self.visit_entries(&node.entries, query, hits);

        let mut children: Vec<(f32, usize)> = node
            .children
            .iter()
            .flatten()
            .filter_map(|&child| {
                self.cells[child]
                    .loose_bounds()
                    .intersect_ray(&query.ray)
                    .map(|(enter, _)| (enter, child))
            })
            .collect();
        children.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (_, child) in children {
            self.visit(child, query, hits);
        }
    }

    fn visit_entries(&self, entries: &[SpatialKey], query: &RaycastQuery, hits: &mut Vec<RaycastHit>) {
        for key in entries {
            if let Some(hit) = self.test_entry(*key, query, best_distance(hits)) {
                if query.first_hit_only {
                    hits.clear();
                }
                hits.push(hit);
            }
        }
    }

    fn test_entry(&self, key: SpatialKey, query: &RaycastQuery, best: f32) -> Option<RaycastHit> {
        let entry = self.entries.get(key)?;
        if !query.layers.test(entry.item.layers) {
            return None;
        }
        let enter = entry.sphere.intersect_ray(&query.ray)?;
        if enter > query.far || (query.first_hit_only && enter > best) {
            return None;
        }

        // Local-space test; the direction keeps world length so t stays a world distance
        let inverse = entry.item.matrix.try_inverse()?;
        let local = query.ray.transformed(&inverse);
        let distance = entry.item.geometry.intersect_ray(&local)?;
        if distance < query.near || distance > query.far {
            return None;
        }
        if query.first_hit_only && distance >= best {
            return None;
        }

        Some(RaycastHit {
            distance,
            point: query.ray.point_at(distance),
            key,
            node: entry.item.node,
            entity: entry.item.entity,
        })
    }
}

fn best_distance(hits: &[RaycastHit]) -> f32 {
    hits.iter().map(|hit| hit.distance).fold(f32::INFINITY, f32::min)
}

fn world_sphere(item: &RenderItem) -> BoundingSphere {
    item.geometry.bounding_sphere().transformed(&item.matrix)
}

impl SpatialIndex for LooseOctree {
    fn insert(&mut self, item: RenderItem) -> SpatialKey {
        let sphere = world_sphere(&item);
        let key = self.entries.insert(Entry { item, sphere, cell: self.root });
        let cell = self.place(key, &sphere);
        if let Some(entry) = self.entries.get_mut(key) {
            entry.cell = cell;
        }
        log::trace!("Spatial insert {:?} into cell {}", key, cell);
        key
    }

    fn move_item(&mut self, key: SpatialKey, matrix: &Mat4) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        entry.item.matrix = *matrix;
        entry.sphere = world_sphere(&entry.item);
        let (sphere, cell) = (entry.sphere, entry.cell);

        if self.cells[cell].fits(&sphere) {
            return true;
        }
        self.unlink(key, cell);
        let cell = self.place(key, &sphere);
        if let Some(entry) = self.entries.get_mut(key) {
            entry.cell = cell;
        }
        true
    }

    fn set_layers(&mut self, key: SpatialKey, layers: Layers) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.item.layers = layers;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, key: SpatialKey) -> Option<RenderItem> {
        let entry = self.entries.remove(key)?;
        self.unlink(key, entry.cell);
        Some(entry.item)
    }

    fn raycast(&self, query: &RaycastQuery) -> Vec<RaycastHit> {
        let mut hits = Vec::new();
        if query.layers.is_empty() || query.far < query.near {
            return hits;
        }
        self.visit(self.root, query, &mut hits);
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        if query.first_hit_only {
            hits.truncate(1);
        }
        hits
    }

    fn get(&self, key: SpatialKey) -> Option<&RenderItem> {
        self.entries.get(key).map(|entry| &entry.item)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove every item and collapse to a single root cell
    fn clear(&mut self) {
        let root = &self.cells[self.root];
        let fresh = Cell::new(root.center, root.size, None);
        self.cells = vec![fresh];
        self.free_cells.clear();
        self.root = 0;
        self.entries.clear();
    }
}

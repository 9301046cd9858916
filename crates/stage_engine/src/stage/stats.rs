//! Stage statistics

/// Snapshot of what the stage is drawing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageStats {
    /// Batches ever created, empty ones included
    pub batches: usize,
    /// Attached draws, i.e. draw calls per frame
    pub draw_calls: usize,
    /// Live batched instances
    pub instances: usize,
    /// Live single meshes
    pub single_meshes: usize,
    /// Triangles across distinct geometries
    pub triangles: usize,
    /// Distinct geometries in use
    pub geometries: usize,
    /// Distinct materials in use
    pub materials: usize,
    /// Texture bytes across distinct materials
    pub texture_bytes: usize,
    /// Items in the spatial index
    pub spatial_items: usize,
}

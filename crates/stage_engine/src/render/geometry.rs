//! Shared geometry and the per-stage geometry cache
//!
//! All primitives of one kind share a single unit-sized geometry; the
//! requested size reaches the GPU through the instance transform, never
//! through a per-object mesh.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::foundation::math::Vec3;
use crate::spatial::{Aabb, BoundingSphere, Ray, Triangle};

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a geometry, part of every batch signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(u64);

impl GeometryId {
    fn next() -> Self {
        Self(NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Built-in primitive shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// Unit cube centered on the origin
    Box,
    /// Radius-1 UV sphere
    Sphere,
    /// Radius-1, height-1 cylinder along Y
    Cylinder,
    /// Radius-1, height-1 cone along Y, apex up
    Cone,
    /// Major radius 1, tube radius 0.3, in the XY plane
    Torus,
    /// 1x1 quad in the XY plane facing +Z
    Plane,
}

/// Error for an unknown primitive kind name
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[prim] kind invalid: {0:?} (expected one of box, sphere, cylinder, cone, torus, plane)")]
pub struct InvalidKind(pub String);

impl PrimitiveKind {
    /// Every kind, in declaration order
    pub const ALL: [PrimitiveKind; 6] = [
        PrimitiveKind::Box,
        PrimitiveKind::Sphere,
        PrimitiveKind::Cylinder,
        PrimitiveKind::Cone,
        PrimitiveKind::Torus,
        PrimitiveKind::Plane,
    ];

    /// Script-facing name
    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveKind::Box => "box",
            PrimitiveKind::Sphere => "sphere",
            PrimitiveKind::Cylinder => "cylinder",
            PrimitiveKind::Cone => "cone",
            PrimitiveKind::Torus => "torus",
            PrimitiveKind::Plane => "plane",
        }
    }

    /// Scale that stretches the unit geometry to a requested size
    ///
    /// Spheres and tori read the first entry as a radius; cylinders and
    /// cones read radius then height; boxes and planes map straight through.
    pub fn scale_for_size(self, size: [f32; 3]) -> Vec3 {
        match self {
            PrimitiveKind::Sphere | PrimitiveKind::Torus => Vec3::new(size[0], size[0], size[0]),
            PrimitiveKind::Cylinder | PrimitiveKind::Cone => Vec3::new(size[0], size[1], size[0]),
            PrimitiveKind::Box | PrimitiveKind::Plane => Vec3::new(size[0], size[1], size[2]),
        }
    }
}

impl FromStr for PrimitiveKind {
    type Err = InvalidKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrimitiveKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| InvalidKind(s.to_string()))
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indexed triangle geometry with precomputed local bounds
#[derive(Debug)]
pub struct Geometry {
    id: GeometryId,
    positions: Vec<Vec3>,
    indices: Vec<u32>,
    bounds: Aabb,
    sphere: BoundingSphere,
}

impl Geometry {
    /// Build a geometry from positions and triangle indices
    ///
    /// Indices that point past the vertex list are dropped with their
    /// triangle so raycasts never index out of bounds.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let vertex_count = positions.len();
        let indices: Vec<u32> = indices
            .chunks_exact(3)
            .filter(|tri| tri.iter().all(|&i| (i as usize) < vertex_count))
            .flatten()
            .copied()
            .collect();
        let bounds = Aabb::from_points(&positions).unwrap_or(Aabb::new(Vec3::zeros(), Vec3::zeros()));
        let center = bounds.center();
        let radius = positions
            .iter()
            .map(|p| (p - center).magnitude())
            .fold(0.0f32, f32::max);

        Self {
            id: GeometryId::next(),
            positions,
            indices,
            bounds,
            sphere: BoundingSphere::new(center, radius),
        }
    }

    /// Generate the unit geometry for a primitive kind
    pub fn primitive(kind: PrimitiveKind) -> Self {
        let (positions, indices) = match kind {
            PrimitiveKind::Box => box_mesh(),
            PrimitiveKind::Sphere => sphere_mesh(1.0, 16, 12),
            PrimitiveKind::Cylinder => cylinder_mesh(1.0, 1.0, 1.0, 16),
            PrimitiveKind::Cone => cylinder_mesh(0.0, 1.0, 1.0, 16),
            PrimitiveKind::Torus => torus_mesh(1.0, 0.3, 12, 16),
            PrimitiveKind::Plane => plane_mesh(),
        };
        Self::new(positions, indices)
    }

    /// Unique identity
    pub fn id(&self) -> GeometryId {
        self.id
    }

    /// Vertex positions
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Triangle indices
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Local-space bounding box
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Local-space bounding sphere
    pub fn bounding_sphere(&self) -> &BoundingSphere {
        &self.sphere
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Nearest local-space hit of a (local-space) ray, as the ray parameter
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        self.bounds.intersect_ray(ray)?;
        self.indices
            .chunks_exact(3)
            .filter_map(|tri| {
                Triangle::new(
                    self.positions[tri[0] as usize],
                    self.positions[tri[1] as usize],
                    self.positions[tri[2] as usize],
                )
                .intersect_ray(ray)
            })
            .min_by(f32::total_cmp)
    }
}

/// Lazily created unit geometries, one per primitive kind
///
/// Owned by a stage; geometries live as long as the cache does.
#[derive(Debug, Default)]
pub struct GeometryCache {
    geometries: HashMap<PrimitiveKind, Rc<Geometry>>,
}

impl GeometryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared unit geometry for `kind`, created on first use
    pub fn get(&mut self, kind: PrimitiveKind) -> Rc<Geometry> {
        Rc::clone(self.geometries.entry(kind).or_insert_with(|| {
            log::debug!("Creating shared {} geometry", kind);
            Rc::new(Geometry::primitive(kind))
        }))
    }

    /// Number of geometries created so far
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    /// True before any geometry was requested
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }
}

fn box_mesh() -> (Vec<Vec3>, Vec<u32>) {
    // (normal axis, u axis, v axis) per face
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::x(), -Vec3::z(), Vec3::y()),
        (-Vec3::x(), Vec3::z(), Vec3::y()),
        (Vec3::y(), Vec3::x(), -Vec3::z()),
        (-Vec3::y(), Vec3::x(), Vec3::z()),
        (Vec3::z(), Vec3::x(), Vec3::y()),
        (-Vec3::z(), -Vec3::x(), Vec3::y()),
    ];
    let mut positions = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = positions.len() as u32;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            positions.push(normal * 0.5 + u * su + v * sv);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (positions, indices)
}

fn plane_mesh() -> (Vec<Vec3>, Vec<u32>) {
    let positions = vec![
        Vec3::new(-0.5, -0.5, 0.0),
        Vec3::new(0.5, -0.5, 0.0),
        Vec3::new(0.5, 0.5, 0.0),
        Vec3::new(-0.5, 0.5, 0.0),
    ];
    (positions, vec![0, 1, 2, 0, 2, 3])
}

fn sphere_mesh(radius: f32, width_segments: u32, height_segments: u32) -> (Vec<Vec3>, Vec<u32>) {
    use std::f32::consts::{PI, TAU};

    let mut positions = Vec::new();
    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            positions.push(Vec3::new(
                -radius * (u * TAU).cos() * (v * PI).sin(),
                radius * (v * PI).cos(),
                radius * (u * TAU).sin() * (v * PI).sin(),
            ));
        }
    }

    let row = width_segments + 1;
    let mut indices = Vec::new();
    for iy in 0..height_segments {
        for ix in 0..width_segments {
            let a = iy * row + ix + 1;
            let b = iy * row + ix;
            let c = (iy + 1) * row + ix;
            let d = (iy + 1) * row + ix + 1;
            // Pole rows collapse to a single triangle
            if iy != 0 {
                indices.extend_from_slice(&[a, b, d]);
            }
            if iy != height_segments - 1 {
                indices.extend_from_slice(&[b, c, d]);
            }
        }
    }
    (positions, indices)
}

fn cylinder_mesh(radius_top: f32, radius_bottom: f32, height: f32, radial_segments: u32) -> (Vec<Vec3>, Vec<u32>) {
    use std::f32::consts::TAU;

    let half = height * 0.5;
    let ring = |radius: f32, y: f32, positions: &mut Vec<Vec3>| {
        for i in 0..radial_segments {
            let theta = i as f32 / radial_segments as f32 * TAU;
            positions.push(Vec3::new(radius * theta.sin(), y, radius * theta.cos()));
        }
    };

    let mut positions = Vec::new();
    ring(radius_top, half, &mut positions);
    ring(radius_bottom, -half, &mut positions);
    let top_center = positions.len() as u32;
    positions.push(Vec3::new(0.0, half, 0.0));
    let bottom_center = positions.len() as u32;
    positions.push(Vec3::new(0.0, -half, 0.0));

    let mut indices = Vec::new();
    for i in 0..radial_segments {
        let next = (i + 1) % radial_segments;
        let (t0, t1) = (i, next);
        let (b0, b1) = (radial_segments + i, radial_segments + next);
        indices.extend_from_slice(&[t0, b0, t1, t1, b0, b1]);
        if radius_top > 0.0 {
            indices.extend_from_slice(&[top_center, t0, t1]);
        }
        if radius_bottom > 0.0 {
            indices.extend_from_slice(&[bottom_center, b1, b0]);
        }
    }
    (positions, indices)
}

fn torus_mesh(radius: f32, tube: f32, radial_segments: u32, tubular_segments: u32) -> (Vec<Vec3>, Vec<u32>) {
    use std::f32::consts::TAU;

    let mut positions = Vec::new();
    for j in 0..=radial_segments {
        let v = j as f32 / radial_segments as f32 * TAU;
        for i in 0..=tubular_segments {
            let u = i as f32 / tubular_segments as f32 * TAU;
            positions.push(Vec3::new(
                (radius + tube * v.cos()) * u.cos(),
                (radius + tube * v.cos()) * u.sin(),
                tube * v.sin(),
            ));
        }
    }

    let row = tubular_segments + 1;
    let mut indices = Vec::new();
    for j in 1..=radial_segments {
        for i in 1..=tubular_segments {
            let a = row * j + i - 1;
            let b = row * (j - 1) + i - 1;
            let c = row * (j - 1) + i;
            let d = row * j + i;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }
    (positions, indices)
}

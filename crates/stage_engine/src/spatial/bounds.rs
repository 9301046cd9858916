//! Bounding volumes and ray primitives
//!
//! Shared by geometry (local bounds), the spatial index (world bounds and
//! node cells) and the stage raycasts.

use crate::foundation::math::{Mat4, Mat4Ext, Point3, Vec3};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given half extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box containing every point, `None` for an empty slice
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        Some(points.iter().skip(1).fold(Self::new(first, first), |acc, p| Self {
            min: acc.min.inf(p),
            max: acc.max.sup(p),
        }))
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Test ray intersection with this AABB using the slab method
    ///
    /// Returns `(t_enter, t_exit)` along the ray; `t_enter` is clamped to 0
    /// when the origin is inside the box.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32)> {
        let inv_dir = Vec3::new(
            if ray.direction.x != 0.0 { 1.0 / ray.direction.x } else { f32::INFINITY },
            if ray.direction.y != 0.0 { 1.0 / ray.direction.y } else { f32::INFINITY },
            if ray.direction.z != 0.0 { 1.0 / ray.direction.z } else { f32::INFINITY },
        );

        let t1 = (self.min.x - ray.origin.x) * inv_dir.x;
        let t2 = (self.max.x - ray.origin.x) * inv_dir.x;
        let t3 = (self.min.y - ray.origin.y) * inv_dir.y;
        let t4 = (self.max.y - ray.origin.y) * inv_dir.y;
        let t5 = (self.min.z - ray.origin.z) * inv_dir.z;
        let t6 = (self.max.z - ray.origin.z) * inv_dir.z;

        // NaN from 0 * inf on an axis-parallel ray sitting on a slab plane
        // is dropped by f32::min/max, which keeps the test conservative
        let tmin = t1.min(t2).max(t3.min(t4)).max(t5.min(t6));
        let tmax = t1.max(t2).min(t3.max(t4)).min(t5.max(t6));

        if tmax >= tmin && tmax >= 0.0 {
            Some((tmin.max(0.0), tmax))
        } else {
            None
        }
    }
}

/// A bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// The center position of the sphere
    pub center: Vec3,
    /// The radius of the sphere
    pub radius: f32,
}

impl BoundingSphere {
    /// Creates a new bounding sphere with the given center and radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere around a box, centered on the box center
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self::new(aabb.center(), aabb.extents().magnitude())
    }

    /// Conservative world-space sphere for a local sphere under `matrix`
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let center = matrix.transform_point(&Point3::from(self.center)).coords;
        Self::new(center, self.radius * matrix.max_scale_on_axis())
    }

    /// Entry distance of a ray into the sphere, 0 when the origin is inside
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        let oc = ray.origin - self.center;
        let b = oc.dot(&ray.direction);
        let c = oc.magnitude_squared() - self.radius * self.radius;
        if c > 0.0 && b > 0.0 {
            return None;
        }
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        Some((-b - discriminant.sqrt()).max(0.0))
    }
}

/// A ray for ray casting and picking
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// The origin point of the ray
    pub origin: Vec3,
    /// The direction of the ray (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Creates a new ray with the given origin and direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get a point along the ray at distance t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray expressed in the space `matrix` maps into
    ///
    /// The direction is not renormalized so that `t` values stay
    /// comparable with points computed back in the source space.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            origin: matrix.transform_point(&Point3::from(self.origin)).coords,
            direction: matrix.transform_vector(&self.direction),
        }
    }
}

/// A triangle for ray intersection tests
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    /// First vertex
    pub v0: Vec3,
    /// Second vertex
    pub v1: Vec3,
    /// Third vertex
    pub v2: Vec3,
}

impl Triangle {
    /// Creates a new triangle
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// Möller-Trumbore ray-triangle intersection, both faces
    ///
    /// Returns the ray parameter `t` of the hit.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        const EPSILON: f32 = 1e-7;

        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;
        let h = ray.direction.cross(&edge2);
        let a = edge1.dot(&h);

        // Ray parallel to triangle
        if a.abs() < EPSILON {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(&edge1);
        let v = f * ray.direction.dot(&q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(&q);
        (t >= 0.0).then_some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_contains_point() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(aabb.contains_point(Vec3::zeros()));
        assert!(aabb.contains_point(Vec3::new(0.5, 0.5, 0.5)));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_aabb_ray_slab() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let (enter, exit) = aabb.intersect_ray(&ray).unwrap();
        assert_relative_eq!(enter, 4.0);
        assert_relative_eq!(exit, 6.0);

        let miss = Ray::new(Vec3::new(3.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(aabb.intersect_ray(&miss).is_none());
    }

    #[test]
    fn test_from_points() {
        let aabb = Aabb::from_points(&[Vec3::new(1.0, -2.0, 0.0), Vec3::new(-1.0, 3.0, 0.5)]).unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 3.0, 0.5));
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn test_sphere_transformed_uses_largest_scale() {
        let sphere = BoundingSphere::new(Vec3::zeros(), 1.0);
        let matrix = Mat4::new_translation(&Vec3::new(0.0, 5.0, 0.0))
            * Mat4::new_nonuniform_scaling(&Vec3::new(1.0, 3.0, 2.0));
        let world = sphere.transformed(&matrix);
        assert_relative_eq!(world.radius, 3.0);
        assert_relative_eq!(world.center.y, 5.0);
    }

    #[test]
    fn test_sphere_ray() {
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, -10.0), 2.0);
        let ray = Ray::new(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(sphere.intersect_ray(&ray).unwrap(), 8.0);
        let behind = Ray::new(Vec3::zeros(), Vec3::new(0.0, 0.0, 1.0));
        assert!(sphere.intersect_ray(&behind).is_none());
    }

    #[test]
    fn test_triangle_hit_both_faces() {
        let tri = Triangle::new(
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let front = Ray::new(Vec3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, -1.0));
        let back = Ray::new(Vec3::new(0.0, 0.0, -3.0), Vec3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(front.point_at(tri.intersect_ray(&front).unwrap()).z, 0.0);
        assert_relative_eq!(tri.intersect_ray(&back).unwrap(), 3.0);
    }
}

//! Math utilities and types
//!
//! Provides fundamental math types for the stage: vectors, matrices,
//! quaternions and a TRS transform that composes into a world matrix.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position relative to the parent
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix (T * R * S)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Extension trait for Mat4 with stage-specific helpers
pub trait Mat4Ext {
    /// Largest scale factor across the three basis columns
    fn max_scale_on_axis(&self) -> f32;

    /// Translation component
    fn translation(&self) -> Vec3;

    /// Column-major flat copy, the layout instance buffers upload
    fn to_cols_array(&self) -> [f32; 16];
}

impl Mat4Ext for Mat4 {
    fn max_scale_on_axis(&self) -> f32 {
        let sx = Vec3::new(self.m11, self.m21, self.m31).magnitude_squared();
        let sy = Vec3::new(self.m12, self.m22, self.m32).magnitude_squared();
        let sz = Vec3::new(self.m13, self.m23, self.m33).magnitude_squared();
        sx.max(sy).max(sz).sqrt()
    }

    fn translation(&self) -> Vec3 {
        Vec3::new(self.m14, self.m24, self.m34)
    }

    fn to_cols_array(&self) -> [f32; 16] {
        let mut out = [0.0; 16];
        out.copy_from_slice(self.as_slice());
        out
    }
}

/// Math utility functions
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }

    /// Linear interpolation
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_compose_order() {
        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::identity(),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };
        let matrix = transform.to_matrix();
        let p = matrix.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 3.0);
        assert_relative_eq!(p.y, 2.0);
        assert_relative_eq!(p.z, 3.0);
    }

    #[test]
    fn test_max_scale_on_axis() {
        let matrix = Mat4::new_nonuniform_scaling(&Vec3::new(1.0, 4.0, 2.0));
        assert_relative_eq!(matrix.max_scale_on_axis(), 4.0);
    }

    #[test]
    fn test_cols_array_is_column_major() {
        let matrix = Mat4::new_translation(&Vec3::new(5.0, 6.0, 7.0));
        let cols = matrix.to_cols_array();
        assert_eq!(&cols[12..15], &[5.0, 6.0, 7.0]);
    }
}

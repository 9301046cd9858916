//! # Camera and viewport
//!
//! The stage only needs the camera for picking: pointer and reticle
//! raycasts unproject normalized device coordinates back into a world
//! ray. Projection follows the OpenGL clip convention (`z` in `[-1, 1]`).

use crate::foundation::math::{utils, Mat4, Point3, Vec2, Vec3, Vec4};
use crate::spatial::Ray;

/// Perspective camera
///
/// # Coordinate System
/// Right-handed, Y-up. The camera looks from `position` toward `target`.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation (typically [0, 1, 0])
    pub up: Vec3,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,
}

impl Camera {
    /// Create a perspective camera looking at the origin
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Aspect ratio (width / height) of the viewport
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
        }
    }

    /// Point the camera at `target`
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        log::trace!("Camera look_at updated - target: {:?}, up: {:?}", target, up);
    }

    /// Update the aspect ratio after a viewport resize
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::debug!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// World-to-camera transform
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(
            &Point3::from(self.position),
            &Point3::from(self.target),
            &self.up,
        )
    }

    /// Camera-to-clip transform
    pub fn projection_matrix(&self) -> Mat4 {
        nalgebra::Perspective3::new(self.aspect, self.fov, self.near, self.far).to_homogeneous()
    }

    /// Combined world-to-clip transform
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// World ray through a point in normalized device coordinates
    ///
    /// `(0, 0)` is the viewport center, `(-1, -1)` the bottom-left corner.
    /// The ray starts at the camera position. Returns `None` when the
    /// camera matrices are degenerate.
    pub fn ray_from_ndc(&self, ndc: Vec2) -> Option<Ray> {
        let inverse = self.view_projection_matrix().try_inverse()?;
        let unproject = |z: f32| {
            let h = inverse * Vec4::new(ndc.x, ndc.y, z, 1.0);
            (h.w != 0.0).then(|| Vec3::new(h.x / h.w, h.y / h.w, h.z / h.w))
        };
        let near = unproject(-1.0)?;
        let far = unproject(1.0)?;
        let direction = far - near;
        if direction.magnitude_squared() == 0.0 {
            return None;
        }
        Some(Ray::new(self.position, direction))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Vec3::new(0.0, 0.0, 5.0), 70.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}

/// Screen rectangle the stage renders into, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge
    pub left: f32,
    /// Top edge
    pub top: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl Viewport {
    /// Viewport anchored at the screen origin
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width,
            height,
        }
    }

    /// Width over height
    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }

    /// Convert a screen position to normalized device coordinates
    ///
    /// Screen Y grows downward; NDC Y grows upward.
    pub fn screen_to_ndc(&self, screen: Vec2) -> Vec2 {
        Vec2::new(
            ((screen.x - self.left) / self.width) * 2.0 - 1.0,
            -((screen.y - self.top) / self.height) * 2.0 + 1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_center_ray_points_at_target() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, 1.0, 0.1, 100.0);
        let ray = camera.ray_from_ndc(Vec2::zeros()).unwrap();
        assert_relative_eq!(ray.origin, Vec3::new(0.0, 0.0, 10.0));
        assert_relative_eq!(ray.direction, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_corner_ray_leans_toward_corner() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, 1.0, 0.1, 100.0);
        let ray = camera.ray_from_ndc(Vec2::new(1.0, 1.0)).unwrap();
        assert!(ray.direction.x > 0.0);
        assert!(ray.direction.y > 0.0);
        assert!(ray.direction.z < 0.0);
    }

    #[test]
    fn test_screen_to_ndc() {
        let viewport = Viewport { left: 100.0, top: 50.0, width: 200.0, height: 100.0 };
        assert_relative_eq!(viewport.screen_to_ndc(Vec2::new(200.0, 100.0)), Vec2::zeros());
        assert_relative_eq!(viewport.screen_to_ndc(Vec2::new(100.0, 50.0)), Vec2::new(-1.0, 1.0));
        assert_relative_eq!(viewport.aspect(), 2.0);
    }
}

//! Camera settings and the view/projection matrices built from them.
//!
//! All projections are left-handed with depth mapped to `[0, 1]`.

use glam::{Mat4, Vec3};

use super::transform::euler_degrees_to_quat;

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionMode {
    #[default]
    Perspective,
    Orthographic,
}

/// Lens settings supplied with every render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    pub mode: ProjectionMode,
    /// Aspect ratio numerator, used by the orthographic volume.
    pub aspect_width: f32,
    /// Aspect ratio denominator, used by the orthographic volume.
    pub aspect_height: f32,
    pub ortho_near: f32,
    pub ortho_far: f32,
    /// Scale applied to the aspect to get the orthographic half extents.
    pub ortho_width: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub perspective_near: f32,
    pub perspective_far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            mode: ProjectionMode::Perspective,
            aspect_width: 16.0,
            aspect_height: 9.0,
            ortho_near: 0.0,
            ortho_far: 100.0,
            ortho_width: 1.0,
            fov: 45.0,
            perspective_near: 0.1,
            perspective_far: 100.0,
        }
    }
}

impl CameraSettings {
    pub fn perspective(fov: f32, near: f32, far: f32) -> Self {
        Self {
            mode: ProjectionMode::Perspective,
            fov,
            perspective_near: near,
            perspective_far: far,
            ..Default::default()
        }
    }

    pub fn orthographic(ortho_width: f32, near: f32, far: f32) -> Self {
        Self {
            mode: ProjectionMode::Orthographic,
            ortho_width,
            ortho_near: near,
            ortho_far: far,
            ..Default::default()
        }
    }

    /// Projection matrix for a viewport of the given size in pixels.
    ///
    /// Perspective projections take their aspect ratio from the viewport;
    /// orthographic ones from `aspect_width`/`aspect_height`.
    pub fn projection_matrix(&self, viewport_width: f32, viewport_height: f32) -> Mat4 {
        match self.mode {
            ProjectionMode::Perspective => Mat4::perspective_lh(
                self.fov.to_radians(),
                viewport_width / viewport_height,
                self.perspective_near,
                self.perspective_far,
            ),
            ProjectionMode::Orthographic => {
                let half_width = self.aspect_width * self.ortho_width;
                let half_height = self.aspect_height * self.ortho_width;
                Mat4::orthographic_lh(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    self.ortho_near,
                    self.ortho_far,
                )
            }
        }
    }
}

/// View matrix for a camera at `position` with Euler `rotation` in degrees.
pub fn view_matrix(position: Vec3, rotation: Vec3) -> Mat4 {
    Mat4::from_rotation_translation(euler_degrees_to_quat(rotation), position).inverse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_default_settings() {
        let s = CameraSettings::default();
        assert_eq!(s.mode, ProjectionMode::Perspective);
        assert_eq!((s.aspect_width, s.aspect_height), (16.0, 9.0));
        assert_eq!((s.ortho_near, s.ortho_far, s.ortho_width), (0.0, 100.0, 1.0));
        assert_eq!((s.fov, s.perspective_near, s.perspective_far), (45.0, 0.1, 100.0));
    }

    #[test]
    fn test_view_moves_world_into_camera_space() {
        let view = view_matrix(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO);
        let p = view.transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-6));
    }

    #[test]
    fn test_view_undoes_camera_rotation() {
        let view = view_matrix(Vec3::ZERO, Vec3::new(0.0, 90.0, 0.0));
        // The camera faces +X after a 90 degree yaw, so +X lands on +Z in view space
        let p = view.transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::Z, 1e-5));
    }

    #[test]
    fn test_perspective_is_left_handed_zero_to_one() {
        let s = CameraSettings::default();
        let proj = s.projection_matrix(1280.0, 720.0);

        let near = proj * Vec4::new(0.0, 0.0, s.perspective_near, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, s.perspective_far, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_perspective_uses_viewport_aspect() {
        let s = CameraSettings::default();
        let wide = s.projection_matrix(2000.0, 1000.0);
        let square = s.projection_matrix(1000.0, 1000.0);
        assert!((square.x_axis.x / wide.x_axis.x - 2.0).abs() < 1e-5);
        assert_eq!(square.y_axis.y, wide.y_axis.y);
    }

    #[test]
    fn test_orthographic_volume_from_aspect_and_width() {
        let s = CameraSettings::orthographic(0.5, 0.0, 10.0);
        let proj = s.projection_matrix(1.0, 1.0);

        // Half extents are 16 * 0.5 by 9 * 0.5
        let corner = proj * Vec4::new(8.0, 4.5, 10.0, 1.0);
        assert!(corner.truncate().abs_diff_eq(Vec3::new(1.0, 1.0, 1.0), 1e-5));
        let origin = proj * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(origin.z.abs() < 1e-6);
    }
}

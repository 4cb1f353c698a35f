//! Object placement in world space.

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

/// Position, Euler rotation in degrees and scale of an object.
///
/// The rotation applies X, then Y, then Z about the fixed world axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new(position: Vec3, rotation: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Decompose an affine matrix without shear back into a transform.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        let (z, y, x) = rotation.to_euler(EulerRot::ZYX);
        Self {
            position,
            rotation: Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees()),
            scale,
        }
    }

    /// Rotation as a quaternion.
    pub fn quat(&self) -> Quat {
        euler_degrees_to_quat(self.rotation)
    }

    /// World matrix, translate * rotate * scale.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quat(), self.position)
    }

    /// Add `degrees` to each Euler angle.
    pub fn rotate(&mut self, degrees: Vec3) {
        self.rotation += degrees;
    }
}

/// Quaternion for Euler angles given in degrees, applied X then Y then Z.
pub fn euler_degrees_to_quat(degrees: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZYX,
        degrees.z.to_radians(),
        degrees.y.to_radians(),
        degrees.x.to_radians(),
    )
}

/// Inverse transpose of the upper 3x3 of `world`, widened back to 4x4.
///
/// Keeps normals perpendicular to surfaces under non-uniform scale.
pub fn normal_matrix(world: &Mat4) -> Mat4 {
    Mat4::from_mat3(Mat3::from_mat4(*world).transpose().inverse())
}

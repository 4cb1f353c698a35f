//! Directional light supplied once per frame.

use glam::Vec3;

/// Sun-style light shining along `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    /// World-space direction. Not required to be normalized.
    pub direction: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            direction: Vec3::new(1.0, 0.4, 0.2),
            intensity: 1.0,
        }
    }
}

impl DirectionalLight {
    pub fn new(color: Vec3, direction: Vec3, intensity: f32) -> Self {
        Self {
            color,
            direction,
            intensity,
        }
    }

    /// Color premultiplied by intensity.
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radiance_scales_color() {
        let light = DirectionalLight::new(Vec3::new(1.0, 0.5, 0.25), Vec3::NEG_Y, 4.0);
        assert_eq!(light.radiance(), Vec3::new(4.0, 2.0, 1.0));
    }

    #[test]
    fn test_default_light() {
        let light = DirectionalLight::default();
        assert_eq!(light.color, Vec3::ONE);
        assert_eq!(light.direction, Vec3::new(1.0, 0.4, 0.2));
        assert_eq!(light.intensity, 1.0);
    }
}

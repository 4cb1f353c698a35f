//! Draw items and the batching step that produces them.
//!
//! A [`Renderable`] is whatever the caller's scene holds per visible object.
//! [`build_draw_items`] flattens a collection of them into the per-frame
//! [`DrawItem`] list: hidden entries are dropped, opaque items come first,
//! and alpha-blended items follow in their original relative order.

use glam::{Mat4, Vec2};

use crate::pool::Handle;
use crate::scene::Transform;
use crate::vulkan::upload::{GpuGeometry, GpuTexture};

pub type GeometryHandle = Handle<GpuGeometry>;
pub type TextureHandle = Handle<GpuTexture>;

/// Index into the immutable sampler array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum SamplerKind {
    #[default]
    Linear = 0,
    Nearest = 1,
}

impl SamplerKind {
    pub const ALL: [SamplerKind; 2] = [SamplerKind::Linear, SamplerKind::Nearest];

    pub fn index(self) -> u32 {
        self as u32
    }
}

/// One indexed draw, recorded by [`RenderDevice::submit`](crate::RenderDevice::submit).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub geometry: GeometryHandle,
    pub sampler: SamplerKind,
    pub texture: TextureHandle,
    /// UV multiplier passed to the fragment shader.
    pub texture_scale: Vec2,
    pub world: Mat4,
}

impl Default for DrawItem {
    fn default() -> Self {
        Self {
            geometry: Handle::from_raw(u32::MAX),
            sampler: SamplerKind::Linear,
            texture: Handle::from_raw(0),
            texture_scale: Vec2::ZERO,
            world: Mat4::IDENTITY,
        }
    }
}

impl DrawItem {
    pub fn new(
        geometry: GeometryHandle,
        sampler: SamplerKind,
        texture: TextureHandle,
        texture_scale: Vec2,
        world: Mat4,
    ) -> Self {
        Self {
            geometry,
            sampler,
            texture,
            texture_scale,
            world,
        }
    }
}

/// Surface appearance of a renderable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub alpha_blended: bool,
    pub sampler: SamplerKind,
    pub texture: TextureHandle,
    pub texture_scale: Vec2,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            alpha_blended: false,
            sampler: SamplerKind::Linear,
            texture: Handle::from_raw(0),
            texture_scale: Vec2::ONE,
        }
    }
}

/// A scene object as seen by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Renderable {
    pub transform: Transform,
    pub visible: bool,
    pub geometry: GeometryHandle,
    pub material: Material,
}

impl Renderable {
    pub fn new(geometry: GeometryHandle, transform: Transform, material: Material) -> Self {
        Self {
            transform,
            visible: true,
            geometry,
            material,
        }
    }

    fn to_draw_item(&self) -> DrawItem {
        DrawItem {
            geometry: self.geometry,
            sampler: self.material.sampler,
            texture: self.material.texture,
            texture_scale: self.material.texture_scale,
            world: self.transform.matrix(),
        }
    }
}

/// Flatten visible renderables into draw order, opaque before alpha-blended.
///
/// Blended items keep their input order and are not depth sorted.
pub fn build_draw_items<'a, I>(renderables: I) -> Vec<DrawItem>
where
    I: IntoIterator<Item = &'a Renderable>,
{
    let mut opaque = Vec::new();
    let mut blended = Vec::new();

    for renderable in renderables.into_iter().filter(|r| r.visible) {
        if renderable.material.alpha_blended {
            blended.push(renderable.to_draw_item());
        } else {
            opaque.push(renderable.to_draw_item());
        }
    }

    opaque.append(&mut blended);
    opaque
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn renderable(geometry: u32, alpha_blended: bool) -> Renderable {
        Renderable::new(
            Handle::from_raw(geometry),
            Transform::from_position(Vec3::new(geometry as f32, 0.0, 0.0)),
            Material {
                alpha_blended,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_hidden_items_are_dropped() {
        let mut hidden = renderable(1, false);
        hidden.visible = false;
        let items = build_draw_items(&[renderable(0, false), hidden, renderable(2, true)]);

        let ids: Vec<u32> = items.iter().map(|i| i.geometry.index()).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_world_matrix_comes_from_transform() {
        let mut r = renderable(3, false);
        r.transform.scale = Vec3::splat(2.0);
        r.material.texture_scale = Vec2::new(4.0, 2.0);
        r.material.sampler = SamplerKind::Nearest;

        let item = build_draw_items(std::iter::once(&r))[0];
        assert_eq!(item.world, r.transform.matrix());
        assert_eq!(item.texture_scale, Vec2::new(4.0, 2.0));
        assert_eq!(item.sampler.index(), 1);
    }

    #[test]
    fn test_blended_items_follow_opaque_for_every_ordering() {
        // Every assignment of blend flags over six items
        for mask in 0u32..64 {
            let source: Vec<Renderable> = (0..6)
                .map(|i| renderable(i, mask & (1 << i) != 0))
                .collect();
            let items = build_draw_items(&source);
            assert_eq!(items.len(), 6);

            let flags: Vec<bool> = items
                .iter()
                .map(|item| mask & (1 << item.geometry.index()) != 0)
                .collect();
            let first_blended = flags.iter().position(|&b| b).unwrap_or(flags.len());
            assert!(flags[first_blended..].iter().all(|&b| b), "mask {mask:06b}");

            // Stable within each group
            let opaque: Vec<u32> = items[..first_blended].iter().map(|i| i.geometry.index()).collect();
            let blended: Vec<u32> = items[first_blended..].iter().map(|i| i.geometry.index()).collect();
            assert!(opaque.windows(2).all(|w| w[0] < w[1]));
            assert!(blended.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_defaults() {
        let item = DrawItem::default();
        assert_eq!(item.geometry.index(), u32::MAX);
        assert_eq!(item.world, Mat4::IDENTITY);
        assert_eq!(Material::default().texture_scale, Vec2::ONE);
    }
}

//! Vertex format and built-in primitive generators.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Interleaved vertex consumed by the forward pipeline.
///
/// Tightly packed: position at offset 0, uv at 12, normal at 20.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
}

impl Vertex {
    pub const fn new(position: Vec3, uv: Vec2, normal: Vec3) -> Self {
        Self {
            position,
            uv,
            normal,
        }
    }
}

/// CPU-side geometry ready for upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Square in the XY plane facing -Z.
    pub fn plane(width: f32) -> Self {
        let h = width / 2.0;
        let normal = Vec3::NEG_Z;

        let vertices = vec![
            Vertex::new(Vec3::new(-h, -h, 0.0), Vec2::new(0.0, 1.0), normal),
            Vertex::new(Vec3::new(h, -h, 0.0), Vec2::new(1.0, 1.0), normal),
            Vertex::new(Vec3::new(h, h, 0.0), Vec2::new(1.0, 0.0), normal),
            Vertex::new(Vec3::new(-h, h, 0.0), Vec2::new(0.0, 0.0), normal),
        ];

        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// Axis-aligned cube centered at the origin, one vertex per face corner.
    pub fn cube(width: f32) -> Self {
        let h = width / 2.0;
        let v = |p: [f32; 3], uv: [f32; 2], n: [f32; 3]| {
            Vertex::new(
                Vec3::from(p) * h,
                Vec2::from(uv),
                Vec3::from(n),
            )
        };

        let vertices = vec![
            v([-1.0, -1.0, -1.0], [0.0, 1.0], [0.0, 0.0, -1.0]),
            v([-1.0, 1.0, -1.0], [1.0, 1.0], [0.0, 0.0, -1.0]),
            v([1.0, 1.0, -1.0], [1.0, 0.0], [0.0, 0.0, -1.0]),
            v([1.0, -1.0, -1.0], [0.0, 0.0], [0.0, 0.0, -1.0]),
            v([1.0, 1.0, 1.0], [1.0, 0.0], [1.0, 0.0, 0.0]),
            v([1.0, -1.0, 1.0], [0.0, 0.0], [1.0, 0.0, 0.0]),
            v([-1.0, 1.0, 1.0], [1.0, 0.0], [0.0, 0.0, 1.0]),
            v([-1.0, -1.0, 1.0], [0.0, 0.0], [0.0, 0.0, 1.0]),
            v([1.0, 1.0, -1.0], [1.0, 1.0], [1.0, 0.0, 0.0]),
            v([1.0, 1.0, -1.0], [0.0, 0.0], [0.0, 1.0, 0.0]),
            v([1.0, -1.0, -1.0], [0.0, 1.0], [1.0, 0.0, 0.0]),
            v([1.0, -1.0, -1.0], [0.0, 0.0], [0.0, -1.0, 0.0]),
            v([-1.0, -1.0, -1.0], [0.0, 0.0], [-1.0, 0.0, 0.0]),
            v([-1.0, -1.0, -1.0], [0.0, 1.0], [0.0, -1.0, 0.0]),
            v([-1.0, 1.0, -1.0], [1.0, 0.0], [-1.0, 0.0, 0.0]),
            v([-1.0, 1.0, -1.0], [0.0, 1.0], [0.0, 1.0, 0.0]),
            v([-1.0, 1.0, 1.0], [1.0, 1.0], [-1.0, 0.0, 0.0]),
            v([-1.0, 1.0, 1.0], [1.0, 1.0], [0.0, 1.0, 0.0]),
            v([-1.0, -1.0, 1.0], [1.0, 1.0], [0.0, -1.0, 0.0]),
            v([-1.0, -1.0, 1.0], [0.0, 1.0], [-1.0, 0.0, 0.0]),
            v([1.0, 1.0, 1.0], [1.0, 1.0], [0.0, 0.0, 1.0]),
            v([1.0, 1.0, 1.0], [1.0, 0.0], [0.0, 1.0, 0.0]),
            v([1.0, -1.0, 1.0], [0.0, 1.0], [0.0, 0.0, 1.0]),
            v([1.0, -1.0, 1.0], [1.0, 0.0], [0.0, -1.0, 0.0]),
        ];

        let indices = vec![
            13, 18, 23, 13, 23, 11, // -Y
            9, 21, 15, 21, 17, 15, // +Y
            12, 14, 19, 14, 16, 19, // -X
            7, 6, 22, 6, 20, 22, // +Z
            5, 4, 10, 4, 8, 10, // +X
            3, 2, 0, 2, 1, 0, // -Z
        ];

        Self::new(vertices, indices)
    }

    /// UV sphere with poles on the Z axis.
    ///
    /// `sectors` is clamped to at least 3 and `stacks` to at least 2.
    pub fn sphere(radius: f32, sectors: u32, stacks: u32) -> Self {
        let sectors = sectors.max(3);
        let stacks = stacks.max(2);
        let sector_step = TAU / sectors as f32;
        let stack_step = PI / stacks as f32;

        let mut vertices = Vec::with_capacity(((stacks + 1) * (sectors + 1)) as usize);
        for i in (0..=stacks).rev() {
            let stack_angle = FRAC_PI_2 - i as f32 * stack_step;
            let xy = radius * stack_angle.cos();
            let z = radius * stack_angle.sin();

            for j in 0..=sectors {
                let sector_angle = j as f32 * sector_step;
                let position = Vec3::new(xy * sector_angle.cos(), xy * sector_angle.sin(), z);
                let uv = Vec2::new(j as f32 / sectors as f32, i as f32 / stacks as f32);
                vertices.push(Vertex::new(position, uv, position / radius));
            }
        }

        let mut indices = Vec::with_capacity((6 * sectors * (stacks - 1)) as usize);
        for i in 0..stacks {
            let mut k1 = i * (sectors + 1);
            let mut k2 = k1 + sectors + 1;

            for _ in 0..sectors {
                if i != 0 {
                    indices.extend_from_slice(&[k1, k2, k1 + 1]);
                }
                if i != stacks - 1 {
                    indices.extend_from_slice(&[k1 + 1, k2, k2 + 1]);
                }
                k1 += 1;
                k2 += 1;
            }
        }

        Self::new(vertices, indices)
    }

    /// Capped cylinder along Z, centered at the origin.
    ///
    /// Differing radii give a truncated cone. `sectors` is clamped to at
    /// least 3 and `stacks` to at least 1.
    pub fn cylinder(
        base_radius: f32,
        top_radius: f32,
        height: f32,
        sectors: u32,
        stacks: u32,
    ) -> Self {
        tapered_tube(base_radius, top_radius, height, sectors, stacks, true)
    }

    /// Cone along Z with its apex at `+height / 2`.
    pub fn cone(base_radius: f32, height: f32, sectors: u32, stacks: u32) -> Self {
        tapered_tube(base_radius, 0.0, height, sectors, stacks, false)
    }
}

fn tapered_tube(
    base_radius: f32,
    top_radius: f32,
    height: f32,
    sectors: u32,
    stacks: u32,
    top_cap: bool,
) -> MeshData {
    let sectors = sectors.max(3);
    let stacks = stacks.max(1);
    let sector_step = TAU / sectors as f32;
    let half_height = height * 0.5;

    // Side normals tilt towards +Z as the tube narrows
    let z_angle = (base_radius - top_radius).atan2(height);
    let (normal_z, normal_xy) = z_angle.sin_cos();

    let mut vertices = Vec::new();
    for i in (0..=stacks).rev() {
        let f = i as f32 / stacks as f32;
        let z = -half_height + f * height;
        let radius = base_radius + f * (top_radius - base_radius);
        let t = 1.0 - f;

        for j in 0..=sectors {
            let (sin, cos) = (j as f32 * sector_step).sin_cos();
            vertices.push(Vertex::new(
                Vec3::new(cos * radius, sin * radius, z),
                Vec2::new(j as f32 / sectors as f32, t),
                Vec3::new(cos * normal_xy, sin * normal_xy, normal_z),
            ));
        }
    }

    let base_cap_start = vertices.len() as u32;
    let rim = |i: u32, radius: f32, z: f32| {
        let (sin, cos) = (i as f32 * sector_step).sin_cos();
        Vec3::new(radius * cos, radius * sin, z)
    };

    for i in 0..sectors + 2 {
        let p = rim(i, base_radius, -half_height);
        let uv = Vec2::new(
            0.5 - p.x / (2.0 * base_radius),
            0.5 - p.y / (2.0 * base_radius),
        );
        vertices.push(Vertex::new(p, uv, Vec3::NEG_Z));
    }
    vertices.push(Vertex::new(
        Vec3::new(0.0, 0.0, -half_height),
        Vec2::splat(0.5),
        Vec3::NEG_Z,
    ));

    let top_cap_start = vertices.len() as u32;
    if top_cap {
        for i in (1..=sectors + 2).rev() {
            let p = rim(i, top_radius, half_height);
            let uv = Vec2::new(
                0.5 + p.x / (2.0 * top_radius),
                0.5 + p.y / (2.0 * top_radius),
            );
            vertices.push(Vertex::new(p, uv, Vec3::Z));
        }
        vertices.push(Vertex::new(
            Vec3::new(0.0, 0.0, half_height),
            Vec2::splat(0.5),
            Vec3::Z,
        ));
    }

    let mut indices = Vec::new();
    let mut fan = |start: u32| {
        for i in start + 2..start + sectors {
            indices.extend_from_slice(&[start, i - 1, i]);
        }
    };
    fan(base_cap_start);
    if top_cap {
        fan(top_cap_start);
    }

    for i in 0..stacks {
        let mut k1 = i * (sectors + 1);
        let mut k2 = k1 + sectors + 1;
        for _ in 0..sectors {
            indices.extend_from_slice(&[k1, k1 + 1, k2, k2, k1 + 1, k2 + 1]);
            k1 += 1;
            k2 += 1;
        }
    }

    MeshData::new(vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn assert_indices_in_bounds(mesh: &MeshData) {
        let len = mesh.vertices.len() as u32;
        assert_eq!(mesh.indices.len() % 3, 0);
        for &index in &mesh.indices {
            assert!(index < len, "index {index} out of {len} vertices");
        }
    }

    fn assert_unit_normals(mesh: &MeshData) {
        for v in &mesh.vertices {
            assert!((v.normal.length() - 1.0).abs() < 1e-4, "{:?}", v.normal);
        }
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 12);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 20);
    }

    #[test]
    fn test_plane() {
        let mesh = MeshData::plane(2.0);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(mesh.vertices[2].position, Vec3::new(1.0, 1.0, 0.0));
        assert!(mesh.vertices.iter().all(|v| v.normal == Vec3::NEG_Z));
        assert_eq!(mesh.vertex_bytes().len(), 4 * 32);
        assert_eq!(mesh.index_bytes().len(), 6 * 4);
    }

    #[test]
    fn test_cube() {
        let mesh = MeshData::cube(1.0);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.index_count(), 36);
        assert_indices_in_bounds(&mesh);
        assert_unit_normals(&mesh);

        // Every corner sits on the half-width boundary
        for v in &mesh.vertices {
            assert_eq!(v.position.abs(), Vec3::splat(0.5));
        }
        // Each triangle uses vertices that share one face normal
        for tri in mesh.indices.chunks(3) {
            let n = mesh.vertices[tri[0] as usize].normal;
            assert!(tri.iter().all(|&i| mesh.vertices[i as usize].normal == n));
        }
    }

    #[rstest]
    #[case(8, 4)]
    #[case(36, 18)]
    fn test_sphere(#[case] sectors: u32, #[case] stacks: u32) {
        let mesh = MeshData::sphere(2.0, sectors, stacks);
        assert_eq!(
            mesh.vertices.len() as u32,
            (stacks + 1) * (sectors + 1)
        );
        assert_eq!(mesh.index_count(), 6 * sectors * (stacks - 1));
        assert_indices_in_bounds(&mesh);
        assert_unit_normals(&mesh);
        for v in &mesh.vertices {
            assert!((v.position.length() - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_sphere_starts_at_south_pole() {
        let mesh = MeshData::sphere(1.0, 4, 2);
        assert!(mesh.vertices[0].position.abs_diff_eq(Vec3::NEG_Z, 1e-6));
        assert_eq!(mesh.vertices[0].uv, Vec2::new(0.0, 1.0));
        let last = mesh.vertices.last().unwrap();
        assert!(last.position.abs_diff_eq(Vec3::Z, 1e-6));
    }

    #[rstest]
    #[case(1.0, 1.0, 12, 1)]
    #[case(1.0, 0.5, 16, 3)]
    fn test_cylinder(
        #[case] base: f32,
        #[case] top: f32,
        #[case] sectors: u32,
        #[case] stacks: u32,
    ) {
        let mesh = MeshData::cylinder(base, top, 2.0, sectors, stacks);
        let side = (stacks + 1) * (sectors + 1);
        let cap = sectors + 3;
        assert_eq!(mesh.vertices.len() as u32, side + 2 * cap);

        let cap_triangles = sectors - 2;
        assert_eq!(
            mesh.triangle_count() as u32,
            2 * cap_triangles + 2 * sectors * stacks
        );
        assert_indices_in_bounds(&mesh);
        assert_unit_normals(&mesh);

        // Base cap center and top cap center
        let base_center = mesh.vertices[(side + cap - 1) as usize];
        assert_eq!(base_center.position, Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(base_center.uv, Vec2::splat(0.5));
        let top_center = mesh.vertices.last().unwrap();
        assert_eq!(top_center.position, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(top_center.normal, Vec3::Z);
    }

    #[test]
    fn test_straight_cylinder_side_normals_are_horizontal() {
        let mesh = MeshData::cylinder(1.0, 1.0, 3.0, 8, 2);
        for v in &mesh.vertices[..27] {
            assert!(v.normal.z.abs() < 1e-6);
        }
    }

    #[test]
    fn test_cone() {
        let sectors = 10;
        let stacks = 2;
        let mesh = MeshData::cone(1.0, 2.0, sectors, stacks);
        let side = (stacks + 1) * (sectors + 1);
        assert_eq!(mesh.vertices.len() as u32, side + sectors + 3);
        assert_eq!(
            mesh.triangle_count() as u32,
            (sectors - 2) + 2 * sectors * stacks
        );
        assert_indices_in_bounds(&mesh);
        assert_unit_normals(&mesh);

        // The top ring collapses onto the apex
        for v in &mesh.vertices[..(sectors + 1) as usize] {
            assert!(v.position.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-6));
        }
    }
}

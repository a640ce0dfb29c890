//! Mesh geometry and GPU upload.
//!
//! Geometry is generated on the CPU as [`MeshData`] and uploaded into a
//! [`Mesh`]. Vertex data is split across two buffers, matching
//! [`BufferIndex`]:
//!
//! | Slot | Buffer          | Attribute  | Format    | Location |
//! |------|-----------------|------------|-----------|----------|
//! | 0    | `MeshPositions` | `Position` | Float32x3 | 0        |
//! | 1    | `MeshGenerics`  | `Texcoord` | Float32x2 | 1        |
//!
//! All built-in primitives use counter-clockwise winding for front faces.

use glam::Vec3;

use crate::gpu::GpuContext;
use crate::shader_types::{BufferIndex, VertexAttribute};

/// CPU-side triangle mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Vertex buffer layouts, indexed by [`BufferIndex`] slot.
    pub const LAYOUTS: [wgpu::VertexBufferLayout<'static>; 2] = [
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 3]>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: VertexAttribute::Position as u32,
                format: wgpu::VertexFormat::Float32x3,
            }],
        },
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 2]>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: VertexAttribute::Texcoord as u32,
                format: wgpu::VertexFormat::Float32x2,
            }],
        },
    ];

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Appends a `2*half_u` × `2*half_v` rectangle centered at `center`.
    /// Front-facing towards `half_u × half_v`.
    fn push_face(&mut self, center: Vec3, half_u: Vec3, half_v: Vec3, uv_scale: f32) {
        let base = self.positions.len() as u32;
        let corners = [
            (center - half_u - half_v, [0.0, uv_scale]),
            (center + half_u - half_v, [uv_scale, uv_scale]),
            (center + half_u + half_v, [uv_scale, 0.0]),
            (center - half_u + half_v, [0.0, 0.0]),
        ];
        for (position, uv) in corners {
            self.positions.push(position.to_array());
            self.texcoords.push(uv);
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// A `size`×`size` quad in the XY plane facing +Z.
    pub fn quad(size: f32) -> Self {
        let mut mesh = Self::default();
        let half = size * 0.5;
        mesh.push_face(Vec3::ZERO, Vec3::X * half, Vec3::Y * half, 1.0);
        mesh
    }

    /// A `size`×`size` plane in the XZ plane facing +Y, with the texture
    /// repeated `tiling` times per side.
    pub fn plane(size: f32, tiling: f32) -> Self {
        let mut mesh = Self::default();
        let half = size * 0.5;
        mesh.push_face(Vec3::ZERO, Vec3::X * half, Vec3::NEG_Z * half, tiling);
        mesh
    }

    /// A unit cube centered at the origin, four vertices per face.
    pub fn cube() -> Self {
        let mut mesh = Self::default();
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        for (normal, u, v) in faces {
            mesh.push_face(normal * 0.5, u * 0.5, v * 0.5, 1.0);
        }
        mesh
    }

    /// A unit-radius UV sphere.
    ///
    /// `segments` is the number of slices around the Y axis (min 3) and
    /// `rings` the number of stacks from pole to pole (min 2).
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = Self::default();

        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * std::f32::consts::PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let phi = u * std::f32::consts::TAU;
                mesh.positions.push([
                    theta.sin() * phi.cos(),
                    theta.cos(),
                    theta.sin() * phi.sin(),
                ]);
                mesh.texcoords.push([u, v]);
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let top = ring * stride + segment;
                let bottom = top + stride;
                mesh.indices
                    .extend_from_slice(&[top, top + 1, bottom, top + 1, bottom + 1, bottom]);
            }
        }

        mesh
    }
}

/// GPU-resident mesh.
#[derive(Debug)]
pub struct Mesh {
    pub(crate) position_buffer: wgpu::Buffer,
    pub(crate) generics_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
    pub(crate) index_count: u32,
}

impl Mesh {
    pub fn upload(gpu: &GpuContext, data: &MeshData, label: &str) -> Self {
        use wgpu::util::DeviceExt;

        let position_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Positions")),
                contents: bytemuck::cast_slice(&data.positions),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let generics_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Generics")),
                contents: bytemuck::cast_slice(&data.texcoords),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Indices")),
                contents: bytemuck::cast_slice(&data.indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            position_buffer,
            generics_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        }
    }

    /// Binds the vertex/index buffers and issues the indexed draw.
    pub(crate) fn draw(&self, render_pass: &mut wgpu::RenderPass) {
        render_pass.set_vertex_buffer(
            BufferIndex::MeshPositions.index(),
            self.position_buffer.slice(..),
        );
        render_pass.set_vertex_buffer(
            BufferIndex::MeshGenerics.index(),
            self.generics_buffer.slice(..),
        );
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// Handle to a mesh stored in a [`MeshLibrary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshId(pub(crate) usize);

/// Owns every uploaded mesh; drawables refer to them by [`MeshId`].
#[derive(Debug, Default)]
pub struct MeshLibrary {
    meshes: Vec<Mesh>,
}

impl MeshLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() - 1)
    }

    pub fn upload(&mut self, gpu: &GpuContext, data: &MeshData, label: &str) -> MeshId {
        self.add(Mesh::upload(gpu, data, label))
    }

    pub fn get(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every non-degenerate triangle must wind counter-clockwise when seen
    /// from outside a mesh centered at the origin.
    fn assert_outward_winding(mesh: &MeshData) {
        for triangle in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from(mesh.positions[triangle[i] as usize]));
            let normal = (b - a).cross(c - a);
            if normal.length() < 1e-6 {
                continue;
            }
            let centroid = (a + b + c) / 3.0;
            assert!(
                normal.dot(centroid) > 0.0,
                "triangle {triangle:?} faces inwards"
            );
        }
    }

    fn assert_consistent(mesh: &MeshData) {
        assert_eq!(mesh.positions.len(), mesh.texcoords.len());
        assert_eq!(mesh.indices.len() % 3, 0);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertex_count()));
    }

    #[test]
    fn quad_faces_positive_z() {
        let mesh = MeshData::quad(2.0);
        assert_consistent(&mesh);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        for triangle in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from(mesh.positions[triangle[i] as usize]));
            assert!((b - a).cross(c - a).z > 0.0);
        }
        assert!(mesh.positions.iter().all(|p| p[0].abs() == 1.0 && p[1].abs() == 1.0));
    }

    #[test]
    fn plane_faces_up_and_tiles() {
        let mesh = MeshData::plane(10.0, 4.0);
        assert_consistent(&mesh);
        for triangle in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from(mesh.positions[triangle[i] as usize]));
            assert!((b - a).cross(c - a).y > 0.0);
        }
        assert!(mesh.texcoords.iter().any(|uv| uv[0] == 4.0));
    }

    #[test]
    fn cube_winds_outwards() {
        let mesh = MeshData::cube();
        assert_consistent(&mesh);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        assert_outward_winding(&mesh);
        assert!(
            mesh.positions
                .iter()
                .flatten()
                .all(|c| (c.abs() - 0.5).abs() < 1e-6)
        );
    }

    #[test]
    fn sphere_winds_outwards_on_unit_radius() {
        let mesh = MeshData::sphere(16, 8);
        assert_consistent(&mesh);
        assert_eq!(mesh.vertex_count(), 17 * 9);
        assert_eq!(mesh.triangle_count(), 16 * 8 * 2);
        assert_outward_winding(&mesh);
        for p in &mesh.positions {
            assert!((Vec3::from(*p).length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn sphere_clamps_tessellation() {
        let mesh = MeshData::sphere(0, 0);
        assert_eq!(mesh.triangle_count(), 3 * 2 * 2);
    }

    #[test]
    fn layouts_follow_buffer_indices() {
        let positions = &MeshData::LAYOUTS[BufferIndex::MeshPositions.index() as usize];
        let generics = &MeshData::LAYOUTS[BufferIndex::MeshGenerics.index() as usize];
        assert_eq!(positions.array_stride, 12);
        assert_eq!(positions.attributes[0].shader_location, VertexAttribute::Position.index());
        assert_eq!(generics.array_stride, 8);
        assert_eq!(generics.attributes[0].shader_location, VertexAttribute::Texcoord.index());
    }
}

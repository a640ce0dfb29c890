//! The scene shown by the sample window.
//!
//! Built to stress the K-buffer: a ring of intersecting translucent spheres
//! (where primitive sorting cannot work) and a stack of parallel quads deeper
//! than four layers, over an opaque cube and a checkered floor.

use std::f32::consts::TAU;

use glam::{Mat4, Quat, Vec3};

use crate::gpu::GpuContext;
use crate::mesh::{MeshData, MeshId, MeshLibrary};
use crate::mesh_pass::MaterialSlot;
use crate::scene::{Drawable, Scene};

const SPHERE_COUNT: usize = 6;
const QUAD_COUNT: usize = 6;

const SPHERE_COLORS: [[f32; 4]; SPHERE_COUNT] = [
    [1.0, 0.2, 0.2, 0.45],
    [1.0, 0.7, 0.1, 0.45],
    [0.9, 1.0, 0.2, 0.45],
    [0.2, 1.0, 0.4, 0.45],
    [0.2, 0.6, 1.0, 0.45],
    [0.7, 0.3, 1.0, 0.45],
];

/// Mesh handles of the demo scene.
#[derive(Clone, Copy, Debug)]
pub struct DemoScene {
    floor: MeshId,
    cube: MeshId,
    sphere: MeshId,
    quad: MeshId,
}

impl DemoScene {
    /// Uploads the demo meshes into `meshes`.
    pub fn new(gpu: &GpuContext, meshes: &mut MeshLibrary) -> Self {
        Self {
            floor: meshes.upload(gpu, &MeshData::plane(12.0, 6.0), "Floor"),
            cube: meshes.upload(gpu, &MeshData::cube(), "Cube"),
            sphere: meshes.upload(gpu, &MeshData::sphere(32, 16), "Sphere"),
            quad: meshes.upload(gpu, &MeshData::quad(1.6), "Quad"),
        }
    }

    /// Replaces the contents of `scene` with the demo at `time` seconds.
    pub fn populate(&self, scene: &mut Scene, time: f32) {
        scene.clear();

        let floor = Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0));
        scene.push(
            Drawable::opaque(self.floor, floor, [0.8, 0.8, 0.8])
                .with_material(MaterialSlot::Checker),
        );
        scene.push(Drawable::opaque(
            self.cube,
            Mat4::from_scale_rotation_translation(
                Vec3::splat(0.9),
                Quat::from_rotation_y(time * 0.5),
                Vec3::new(0.0, -0.55, 0.0),
            ),
            [0.9, 0.85, 0.75],
        ));

        // Close enough that neighbours overlap.
        let ring_radius = 1.1;
        for (i, color) in SPHERE_COLORS.iter().enumerate() {
            let angle = time * 0.3 + i as f32 / SPHERE_COUNT as f32 * TAU;
            let bob = (time * 1.3 + i as f32).sin() * 0.15;
            let center = Vec3::new(angle.cos() * ring_radius, 0.2 + bob, angle.sin() * ring_radius);
            scene.push(Drawable::translucent(
                self.sphere,
                Mat4::from_scale_rotation_translation(Vec3::splat(0.7), Quat::IDENTITY, center),
                *color,
            ));
        }

        // Parallel quads facing +Z, front to back along -Z.
        for i in 0..QUAD_COUNT {
            let t = i as f32 / (QUAD_COUNT - 1) as f32;
            let sway = (time * 0.7 + t * 2.0).sin() * 0.2;
            let position = Vec3::new(2.6 + sway, 0.3, 1.2 - t * 2.4);
            let color = [1.0 - t, 0.3, t, 0.35];
            scene.push(Drawable::translucent(self.quad, Mat4::from_translation(position), color));
        }
    }
}

//! Per-frame list of things to draw.
//!
//! A [`Scene`] is rebuilt every frame: the caller clears it, pushes
//! [`Drawable`]s and hands it to the renderer. Opaque and translucent
//! drawables are kept apart so each pass can walk only its own list, and each
//! list keeps submission order.

use glam::Mat4;

use crate::mesh::MeshId;
use crate::mesh_pass::MaterialSlot;

/// How a drawable is composited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Surface {
    /// Written with depth in the opaque pass.
    #[default]
    Opaque,
    /// Blended or captured into the K-buffer, never writes depth.
    Translucent,
}

/// One mesh instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Drawable {
    pub mesh: MeshId,
    pub transform: Mat4,
    /// Straight-alpha tint; alpha only matters for translucent surfaces.
    pub color: [f32; 4],
    pub surface: Surface,
    pub material: MaterialSlot,
}

impl Drawable {
    pub fn opaque(mesh: MeshId, transform: Mat4, color: [f32; 3]) -> Self {
        Self {
            mesh,
            transform,
            color: [color[0], color[1], color[2], 1.0],
            surface: Surface::Opaque,
            material: MaterialSlot::Plain,
        }
    }

    pub fn translucent(mesh: MeshId, transform: Mat4, color: [f32; 4]) -> Self {
        Self {
            mesh,
            transform,
            color,
            surface: Surface::Translucent,
            material: MaterialSlot::Plain,
        }
    }

    pub fn with_material(mut self, material: MaterialSlot) -> Self {
        self.material = material;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    opaque: Vec<Drawable>,
    translucent: Vec<Drawable>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, drawable: Drawable) {
        match drawable.surface {
            Surface::Opaque => self.opaque.push(drawable),
            Surface::Translucent => self.translucent.push(drawable),
        }
    }

    /// Removes every drawable, keeping the allocations.
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.translucent.clear();
    }

    pub fn opaque(&self) -> &[Drawable] {
        &self.opaque
    }

    pub fn translucent(&self) -> &[Drawable] {
        &self.translucent
    }

    pub fn len(&self) -> usize {
        self.opaque.len() + self.translucent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Extend<Drawable> for Scene {
    fn extend<I: IntoIterator<Item = Drawable>>(&mut self, iter: I) {
        for drawable in iter {
            self.push(drawable);
        }
    }
}

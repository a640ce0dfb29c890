//! Types and index constants shared between Rust and the WGSL shaders.
//!
//! Every enum here is a binding contract: the numeric value is used on the
//! host side when building layouts and issuing `set_*` calls, and the same
//! number is spelled out in the `@location` / `@binding` / `@group`
//! attributes of the shaders under `src/shaders/`. The tests at the bottom
//! check both sides agree.
//!
//! The uniform structs are `#[repr(C)]` and padded by hand so their size and
//! field offsets match WGSL's uniform address space layout rules.

/// Vertex buffer slots and uniform bindings in the frame bind group.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferIndex {
    /// Vertex buffer slot holding `vec3<f32>` positions.
    MeshPositions = 0,
    /// Vertex buffer slot holding everything except positions (texcoords).
    MeshGenerics = 1,
    /// Binding of [`FrameUniforms`] in [`BindGroupIndex::Frame`].
    FrameUniforms = 2,
    /// Binding of [`ObjectUniforms`] in [`BindGroupIndex::Frame`].
    ObjectUniforms = 3,
}

/// Shader locations of the mesh vertex attributes.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexAttribute {
    Position = 0,
    Texcoord = 1,
}

/// Bindings in the material bind group.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureIndex {
    BaseColor = 0,
}

/// Number of textures in the material bind group. The base color sampler
/// sits at this binding.
pub const NUM_TEXTURE_INDICES: u32 = 1;

/// Color attachment slots of the K-buffer build pass.
///
/// `Lighting` is the opaque scene color; the build pass leaves that slot
/// empty and writes the layer targets at their own slots.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorAttachment {
    Lighting = 0,
    Ac0V0 = 1,
    Ac1V1 = 2,
    Ac2V2 = 3,
    Ac3V3 = 4,
    D0123 = 5,
}

impl ColorAttachment {
    /// Layer color/transmittance attachments, nearest layer first.
    pub const LAYERS: [ColorAttachment; 4] = [
        ColorAttachment::Ac0V0,
        ColorAttachment::Ac1V1,
        ColorAttachment::Ac2V2,
        ColorAttachment::Ac3V3,
    ];

    /// Total number of attachment slots used by the build pass.
    pub const COUNT: usize = 6;
}

/// Bind group indices used by the mesh pipelines.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindGroupIndex {
    Frame = 0,
    Material = 1,
    Oit = 2,
}

/// Bindings in the OIT bind group of the capture and build passes.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OitBinding {
    Params = 0,
    FragmentCounts = 1,
    Fragments = 2,
    OpaqueDepth = 3,
}

macro_rules! impl_index {
    ($($ty:ty),*) => {
        $(impl $ty {
            pub const fn index(self) -> u32 {
                self as u32
            }
        })*
    };
}

impl_index!(
    BufferIndex,
    VertexAttribute,
    TextureIndex,
    ColorAttachment,
    BindGroupIndex,
    OitBinding
);

/// Per-draw transform block.
///
/// `screen_width` lets the fragment stage turn its pixel coordinate into the
/// linear index `y * screen_width + x` of the per-pixel fragment lists.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub model_view_matrix: [[f32; 4]; 4],
    pub projection_matrix: [[f32; 4]; 4],
    pub view_matrix: [[f32; 4]; 4],
    pub screen_width: u32,
    pub _padding: [u32; 3],
}

impl FrameUniforms {
    pub fn new(
        model_view: glam::Mat4,
        projection: glam::Mat4,
        view: glam::Mat4,
        screen_width: u32,
    ) -> Self {
        Self {
            model_view_matrix: model_view.to_cols_array_2d(),
            projection_matrix: projection.to_cols_array_2d(),
            view_matrix: view.to_cols_array_2d(),
            screen_width,
            _padding: [0; 3],
        }
    }
}

/// Per-draw material tint, straight alpha.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniforms {
    pub color: [f32; 4],
}

/// What the composite pass shows.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewMode {
    /// The resolved image.
    #[default]
    Final = 0,
    /// Depth of the nearest translucent layer as grey.
    LayerDepth = 1,
    /// Number of occupied layers as a heat ramp.
    LayerOccupancy = 2,
}

impl ViewMode {
    pub fn next(self) -> Self {
        match self {
            ViewMode::Final => ViewMode::LayerDepth,
            ViewMode::LayerDepth => ViewMode::LayerOccupancy,
            ViewMode::LayerOccupancy => ViewMode::Final,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewMode::Final => "final",
            ViewMode::LayerDepth => "layer depth",
            ViewMode::LayerOccupancy => "layer occupancy",
        }
    }
}

/// Parameters shared by the capture, build and composite passes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct OitParams {
    /// 0 for alpha blending, otherwise the K-buffer layer count.
    pub layer_count: u32,
    /// Fragment slots per pixel in the capture buffer.
    pub fragment_capacity: u32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub view_mode: u32,
    pub _padding: [u32; 3],
}

/// One captured fragment as stored in the fragment buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PackedFragment {
    /// `pack4x8unorm` of the straight-alpha color.
    pub color: u32,
    pub depth: f32,
}

impl From<crate::kbuffer::Fragment> for PackedFragment {
    fn from(fragment: crate::kbuffer::Fragment) -> Self {
        Self {
            color: fragment.packed_color(),
            depth: fragment.depth,
        }
    }
}

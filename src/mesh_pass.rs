//! Mesh rendering for the opaque, alpha-blended and K-buffer capture passes.
//!
//! All three pipelines share `shaders/mesh.wgsl` and one set of bind groups:
//!
//! - **Group 0** (frame): [`FrameUniforms`] and [`ObjectUniforms`], one slot
//!   per draw addressed with dynamic offsets
//! - **Group 1** (material): base color texture and sampler
//! - **Group 2** (OIT, capture only): pass parameters, per-pixel fragment
//!   counters, fragment slots and the opaque depth buffer
//!
//! Call [`MeshPass::prepare`] once per frame with every draw's uniforms
//! before recording any of the passes.

use std::num::NonZeroU64;

use crate::gpu::GpuContext;
use crate::mesh::{MeshData, MeshId, MeshLibrary};
use crate::shader_types::{
    BindGroupIndex, BufferIndex, FrameUniforms, NUM_TEXTURE_INDICES, ObjectUniforms, OitBinding,
    TextureIndex,
};
use crate::targets::{DEPTH_FORMAT, FrameTargets, LIGHTING_FORMAT};
use crate::texture::Texture;

/// Uniform values for one draw.
#[derive(Clone, Copy, Debug)]
pub struct DrawUniforms {
    pub frame: FrameUniforms,
    pub object: ObjectUniforms,
}

/// Which material bind group a draw samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaterialSlot {
    /// Tint only.
    #[default]
    Plain,
    /// Tinted checkerboard.
    Checker,
}

/// A draw whose uniforms were uploaded by [`MeshPass::prepare`].
#[derive(Clone, Copy, Debug)]
pub struct PreparedDraw {
    pub mesh: MeshId,
    pub material: MaterialSlot,
    /// Index into the uniforms slice passed to `prepare`.
    pub slot: u32,
}

/// Rounds `size` up to a multiple of `alignment` (a power of two).
pub fn aligned_stride(size: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    size.div_ceil(alignment) * alignment
}

pub struct MeshPass {
    opaque_pipeline: wgpu::RenderPipeline,
    alpha_pipeline: wgpu::RenderPipeline,
    capture_pipeline: Option<wgpu::RenderPipeline>,
    frame_layout: wgpu::BindGroupLayout,
    oit_layout: wgpu::BindGroupLayout,
    frame_buffer: wgpu::Buffer,
    object_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    slot_stride: u64,
    slot_capacity: u32,
    plain_material: wgpu::BindGroup,
    checker_material: wgpu::BindGroup,
    oit_bind_group: Option<wgpu::BindGroup>,
    // Kept alive for the material bind groups.
    _textures: [Texture; 2],
}

impl MeshPass {
    const INITIAL_SLOTS: u32 = 64;

    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mesh.wgsl").into()),
        });

        let uniform_entry = |binding: BufferIndex, size: usize| wgpu::BindGroupLayoutEntry {
            binding: binding.index(),
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(size as u64),
            },
            count: None,
        };

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Bind Group Layout"),
            entries: &[
                uniform_entry(BufferIndex::FrameUniforms, std::mem::size_of::<FrameUniforms>()),
                uniform_entry(BufferIndex::ObjectUniforms, std::mem::size_of::<ObjectUniforms>()),
            ],
        });

        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: TextureIndex::BaseColor.index(),
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: NUM_TEXTURE_INDICES,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let storage_entry = |binding: OitBinding, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding: binding.index(),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let oit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Capture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: OitBinding::Params.index(),
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(OitBinding::FragmentCounts, false),
                storage_entry(OitBinding::Fragments, false),
                wgpu::BindGroupLayoutEntry {
                    binding: OitBinding::OpaqueDepth.index(),
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let scene_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&frame_layout, &material_layout],
            push_constant_ranges: &[],
        });

        let capture_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Capture Pipeline Layout"),
            bind_group_layouts: &[&frame_layout, &material_layout, &oit_layout],
            push_constant_ranges: &[],
        });

        let pipeline = |label: &str,
                        layout: &wgpu::PipelineLayout,
                        entry_point: &str,
                        blend: Option<wgpu::BlendState>,
                        write_mask: wgpu::ColorWrites,
                        cull_mode: Option<wgpu::Face>,
                        depth_stencil: Option<wgpu::DepthStencilState>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_mesh"),
                    buffers: &MeshData::LAYOUTS,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: LIGHTING_FORMAT,
                        blend,
                        write_mask,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode,
                    front_face: wgpu::FrontFace::Ccw,
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let opaque_pipeline = pipeline(
            "Opaque Pipeline",
            &scene_layout,
            "fs_opaque",
            Some(wgpu::BlendState::REPLACE),
            wgpu::ColorWrites::ALL,
            Some(wgpu::Face::Back),
            Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
        );

        // Translucent geometry shows its back faces and never writes depth.
        let alpha_pipeline = pipeline(
            "Alpha Blend Pipeline",
            &scene_layout,
            "fs_alpha",
            Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            wgpu::ColorWrites::ALL,
            None,
            Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
        );

        let capture_pipeline = gpu.supports_kbuffer.then(|| {
            pipeline(
                "K-Buffer Capture Pipeline",
                &capture_layout,
                "fs_capture",
                None,
                wgpu::ColorWrites::empty(),
                None,
                None,
            )
        });

        let slot_stride = aligned_stride(
            std::mem::size_of::<FrameUniforms>().max(std::mem::size_of::<ObjectUniforms>()) as u64,
            u64::from(gpu.limits().min_uniform_buffer_offset_alignment),
        );
        let (frame_buffer, object_buffer, frame_bind_group) =
            Self::create_uniform_slots(gpu, &frame_layout, slot_stride, Self::INITIAL_SLOTS);

        let textures = [Texture::white(gpu), Texture::checkerboard(gpu, 256, 8)];
        let material = |texture: &Texture, label: &str| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &material_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: TextureIndex::BaseColor.index(),
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: NUM_TEXTURE_INDICES,
                        resource: wgpu::BindingResource::Sampler(&texture.sampler),
                    },
                ],
            })
        };
        let plain_material = material(&textures[0], "Plain Material");
        let checker_material = material(&textures[1], "Checker Material");

        Self {
            opaque_pipeline,
            alpha_pipeline,
            capture_pipeline,
            frame_layout,
            oit_layout,
            frame_buffer,
            object_buffer,
            frame_bind_group,
            slot_stride,
            slot_capacity: Self::INITIAL_SLOTS,
            plain_material,
            checker_material,
            oit_bind_group: None,
            _textures: textures,
        }
    }

    fn create_uniform_slots(
        gpu: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        slots: u32,
    ) -> (wgpu::Buffer, wgpu::Buffer, wgpu::BindGroup) {
        let buffer = |label: &str| {
            gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: stride * u64::from(slots),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let frame_buffer = buffer("Frame Uniforms");
        let object_buffer = buffer("Object Uniforms");

        fn binding(buffer: &wgpu::Buffer, size: usize) -> wgpu::BindingResource<'_> {
            wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: NonZeroU64::new(size as u64),
            })
        }
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: BufferIndex::FrameUniforms.index(),
                    resource: binding(&frame_buffer, std::mem::size_of::<FrameUniforms>()),
                },
                wgpu::BindGroupEntry {
                    binding: BufferIndex::ObjectUniforms.index(),
                    resource: binding(&object_buffer, std::mem::size_of::<ObjectUniforms>()),
                },
            ],
        });

        (frame_buffer, object_buffer, bind_group)
    }

    /// Whether the K-buffer capture pipeline exists on this device.
    pub fn supports_capture(&self) -> bool {
        self.capture_pipeline.is_some()
    }

    /// Rebuilds the capture bind group after the targets were reallocated.
    pub fn bind_targets(
        &mut self,
        gpu: &GpuContext,
        targets: &FrameTargets,
        params: &wgpu::Buffer,
    ) {
        if self.capture_pipeline.is_none() {
            return;
        }
        self.oit_bind_group = Some(gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Capture Bind Group"),
            layout: &self.oit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: OitBinding::Params.index(),
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: OitBinding::FragmentCounts.index(),
                    resource: targets.fragment_counts.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: OitBinding::Fragments.index(),
                    resource: targets.fragments.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: OitBinding::OpaqueDepth.index(),
                    resource: wgpu::BindingResource::TextureView(&targets.depth.view),
                },
            ],
        }));
    }

    /// Uploads every draw's uniforms, growing the slot buffers if needed.
    pub fn prepare(&mut self, gpu: &GpuContext, draws: &[DrawUniforms]) {
        let needed = draws.len() as u32;
        if needed > self.slot_capacity {
            let capacity = needed.next_power_of_two();
            log::debug!("growing uniform slots from {} to {}", self.slot_capacity, capacity);
            let (frame_buffer, object_buffer, bind_group) =
                Self::create_uniform_slots(gpu, &self.frame_layout, self.slot_stride, capacity);
            self.frame_buffer = frame_buffer;
            self.object_buffer = object_buffer;
            self.frame_bind_group = bind_group;
            self.slot_capacity = capacity;
        }

        let stride = self.slot_stride as usize;
        let mut frame_bytes = vec![0u8; stride * draws.len()];
        let mut object_bytes = vec![0u8; stride * draws.len()];
        for (i, draw) in draws.iter().enumerate() {
            let frame = bytemuck::bytes_of(&draw.frame);
            let object = bytemuck::bytes_of(&draw.object);
            frame_bytes[i * stride..i * stride + frame.len()].copy_from_slice(frame);
            object_bytes[i * stride..i * stride + object.len()].copy_from_slice(object);
        }
        if !draws.is_empty() {
            gpu.queue.write_buffer(&self.frame_buffer, 0, &frame_bytes);
            gpu.queue.write_buffer(&self.object_buffer, 0, &object_bytes);
        }
    }

    fn draw_all(
        &self,
        render_pass: &mut wgpu::RenderPass,
        meshes: &MeshLibrary,
        draws: &[PreparedDraw],
    ) {
        for draw in draws {
            let Some(mesh) = meshes.get(draw.mesh) else {
                log::warn!("skipping draw of unknown mesh {:?}", draw.mesh);
                continue;
            };
            let offset = (u64::from(draw.slot) * self.slot_stride) as u32;
            render_pass.set_bind_group(
                BindGroupIndex::Frame.index(),
                &self.frame_bind_group,
                &[offset, offset],
            );
            let material = match draw.material {
                MaterialSlot::Plain => &self.plain_material,
                MaterialSlot::Checker => &self.checker_material,
            };
            render_pass.set_bind_group(BindGroupIndex::Material.index(), material, &[]);
            mesh.draw(render_pass);
        }
    }

    /// Opaque geometry into `Lighting` with depth writes.
    pub fn render_opaque(
        &self,
        render_pass: &mut wgpu::RenderPass,
        meshes: &MeshLibrary,
        draws: &[PreparedDraw],
    ) {
        render_pass.set_pipeline(&self.opaque_pipeline);
        self.draw_all(render_pass, meshes, draws);
    }

    /// Translucent geometry blended onto `Lighting` in the given order.
    pub fn render_alpha(
        &self,
        render_pass: &mut wgpu::RenderPass,
        meshes: &MeshLibrary,
        draws: &[PreparedDraw],
    ) {
        render_pass.set_pipeline(&self.alpha_pipeline);
        self.draw_all(render_pass, meshes, draws);
    }

    /// Translucent geometry appended to the per-pixel fragment lists.
    ///
    /// Does nothing if the device cannot capture or [`bind_targets`](Self::bind_targets)
    /// was never called.
    pub fn render_capture(
        &self,
        render_pass: &mut wgpu::RenderPass,
        meshes: &MeshLibrary,
        draws: &[PreparedDraw],
    ) {
        let (Some(pipeline), Some(oit_bind_group)) =
            (&self.capture_pipeline, &self.oit_bind_group)
        else {
            return;
        };
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(BindGroupIndex::Oit.index(), oit_bind_group, &[]);
        self.draw_all(render_pass, meshes, draws);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_rounds_up_to_alignment() {
        assert_eq!(aligned_stride(208, 256), 256);
        assert_eq!(aligned_stride(256, 256), 256);
        assert_eq!(aligned_stride(257, 256), 512);
        assert_eq!(aligned_stride(16, 0), 16);
    }

    #[test]
    fn stride_covers_both_uniform_blocks() {
        let size = std::mem::size_of::<FrameUniforms>()
            .max(std::mem::size_of::<ObjectUniforms>()) as u64;
        let stride = aligned_stride(size, 256);
        assert!(stride >= std::mem::size_of::<FrameUniforms>() as u64);
        assert_eq!(stride % 256, 0);
    }
}

//! Final fullscreen pass: resolves the K-buffer layers over `Lighting` and
//! writes the surface.
//!
//! With alpha blending the layer count in [`OitParams`] is zero and the pass
//! reduces to a copy of `Lighting`.
//!
//! [`OitParams`]: crate::shader_types::OitParams

use crate::gpu::GpuContext;
use crate::targets::FrameTargets;

pub struct CompositePass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: Option<wgpu::BindGroup>,
}

impl CompositePass {
    const PARAMS_BINDING: u32 = 0;
    const LIGHTING_BINDING: u32 = 1;
    const FIRST_LAYER_BINDING: u32 = 2;
    const LAYER_DEPTHS_BINDING: u32 = 6;

    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Composite Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/composite.wgsl").into()),
        });

        let texture_entry = |binding: u32, filterable: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: Self::PARAMS_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            texture_entry(Self::LIGHTING_BINDING, true),
        ];
        entries.extend((0..4).map(|i| texture_entry(Self::FIRST_LAYER_BINDING + i, true)));
        // Rgba32Float is not filterable without an extra feature.
        entries.push(texture_entry(Self::LAYER_DEPTHS_BINDING, false));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Composite Bind Group Layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Composite Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_fullscreen"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_composite"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: gpu.config.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
            bind_group: None,
        }
    }

    pub fn bind_targets(
        &mut self,
        gpu: &GpuContext,
        targets: &FrameTargets,
        params: &wgpu::Buffer,
    ) {
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: Self::PARAMS_BINDING,
                resource: params.as_entire_binding(),
            },
            texture_binding(Self::LIGHTING_BINDING, &targets.lighting.view),
        ];
        entries.extend(
            targets
                .layers
                .iter()
                .zip(Self::FIRST_LAYER_BINDING..)
                .map(|(layer, binding)| texture_binding(binding, &layer.view)),
        );
        entries.push(texture_binding(Self::LAYER_DEPTHS_BINDING, &targets.layer_depths.view));

        self.bind_group = Some(gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        }));
    }

    /// Records the composite pass, writing every pixel of `output`.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, output: &wgpu::TextureView) {
        let Some(bind_group) = &self.bind_group else {
            return;
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

fn texture_binding(binding: u32, view: &wgpu::TextureView) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: wgpu::BindingResource::TextureView(view),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPOSITE_WGSL: &str = include_str!("shaders/composite.wgsl");

    #[test]
    fn bindings_match_shader() {
        let names = [
            (CompositePass::PARAMS_BINDING, "oit_params"),
            (CompositePass::LIGHTING_BINDING, "lighting"),
            (CompositePass::FIRST_LAYER_BINDING, "ac0v0"),
            (CompositePass::FIRST_LAYER_BINDING + 3, "ac3v3"),
            (CompositePass::LAYER_DEPTHS_BINDING, "d0123"),
        ];
        for (binding, name) in names {
            let needle = format!("@group(0) @binding({binding}) var");
            let line = COMPOSITE_WGSL
                .lines()
                .find(|line| line.contains(&needle))
                .unwrap_or_else(|| panic!("composite.wgsl is missing `{needle}`"));
            assert!(line.contains(name), "`{line}` should declare {name}");
        }
    }
}

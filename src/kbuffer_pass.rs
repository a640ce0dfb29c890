//! Fullscreen pass turning captured fragment lists into K-buffer layers.
//!
//! Writes `AC0V0`..`AC3V3` and `D0123` at their [`ColorAttachment`] slots.
//! The 2-layer pipeline leaves the `AC2V2` and `AC3V3` slots unbound.

use crate::gpu::GpuContext;
use crate::kbuffer::{FAR_DEPTH, LayerCount};
use crate::shader_types::{ColorAttachment, OitBinding};
use crate::targets::{FrameTargets, KBufferFormats};

/// Clear value of a layer target: no color, full transmittance.
const EMPTY_LAYER: wgpu::Color = wgpu::Color {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};

const EMPTY_DEPTHS: wgpu::Color = wgpu::Color {
    r: FAR_DEPTH as f64,
    g: FAR_DEPTH as f64,
    b: FAR_DEPTH as f64,
    a: FAR_DEPTH as f64,
};

/// Attachment slots written for a layer count, in slot order.
pub fn build_attachments(count: LayerCount) -> Vec<ColorAttachment> {
    ColorAttachment::LAYERS[..count.get()]
        .iter()
        .copied()
        .chain(std::iter::once(ColorAttachment::D0123))
        .collect()
}

pub struct KBufferPass {
    two_layer_pipeline: wgpu::RenderPipeline,
    four_layer_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: Option<wgpu::BindGroup>,
}

impl KBufferPass {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("K-Buffer Build Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/kbuffer_build.wgsl").into()),
        });

        let storage_entry = |binding: OitBinding| wgpu::BindGroupLayoutEntry {
            binding: binding.index(),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("K-Buffer Build Bind Group Layout"),
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
                storage_entry(OitBinding::FragmentCounts),
                storage_entry(OitBinding::Fragments),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("K-Buffer Build Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let formats = KBufferFormats::DEFAULT;
        let pipeline = |count: LayerCount, entry_point: &str| {
            let mut targets: Vec<Option<wgpu::ColorTargetState>> =
                (0..ColorAttachment::COUNT).map(|_| None).collect();
            for attachment in build_attachments(count) {
                let format = match attachment {
                    ColorAttachment::D0123 => formats.d0123,
                    layer => formats.layers()[layer.index() as usize - 1],
                };
                targets[attachment.index() as usize] = Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                });
            }

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_fullscreen"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    targets: &targets,
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
            })
        };

        Self {
            two_layer_pipeline: pipeline(LayerCount::Two, "fs_build_2"),
            four_layer_pipeline: pipeline(LayerCount::Four, "fs_build_4"),
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
        self.bind_group = Some(gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("K-Buffer Build Bind Group"),
            layout: &self.bind_group_layout,
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
            ],
        }));
    }

    /// Records the build pass into `encoder`.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &FrameTargets,
        count: LayerCount,
    ) {
        let Some(bind_group) = &self.bind_group else {
            return;
        };

        let mut attachments: Vec<Option<wgpu::RenderPassColorAttachment>> =
            (0..ColorAttachment::COUNT).map(|_| None).collect();
        for attachment in build_attachments(count) {
            let (view, clear) = match targets.layer(attachment) {
                Some(layer) => (&layer.view, EMPTY_LAYER),
                None => (&targets.layer_depths.view, EMPTY_DEPTHS),
            };
            attachments[attachment.index() as usize] = Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            });
        }

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("K-Buffer Build Pass"),
            color_attachments: &attachments,
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let pipeline = match count {
            LayerCount::Two => &self.two_layer_pipeline,
            LayerCount::Four => &self.four_layer_pipeline,
        };
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_layers_write_first_two_and_depths() {
        assert_eq!(
            build_attachments(LayerCount::Two),
            vec![ColorAttachment::Ac0V0, ColorAttachment::Ac1V1, ColorAttachment::D0123]
        );
    }

    #[test]
    fn four_layers_write_every_layer_slot() {
        let attachments = build_attachments(LayerCount::Four);
        assert_eq!(attachments.len(), 5);
        assert!(!attachments.contains(&ColorAttachment::Lighting));
        assert_eq!(attachments.last(), Some(&ColorAttachment::D0123));
    }
}

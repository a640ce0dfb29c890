//! Frame orchestration.
//!
//! [`Renderer`] owns every pass and screen-sized target and records one frame
//! as:
//!
//! 1. **Opaque**: opaque drawables into `Lighting` with depth, cleared to the
//!    background color. With alpha blending the translucent drawables are
//!    blended in the same pass.
//! 2. **Capture** (K-buffer methods): translucent drawables appended to the
//!    per-pixel fragment lists, tested against the opaque depth.
//! 3. **Build** (K-buffer methods): fragment lists reduced to `AC0V0`..`AC3V3`
//!    and `D0123`.
//! 4. **Composite**: layers resolved over `Lighting` onto the surface.

use crate::camera::Camera;
use crate::composite_pass::CompositePass;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::gpu::GpuContext;
use crate::kbuffer::LayerCount;
use crate::kbuffer_pass::KBufferPass;
use crate::mesh::MeshLibrary;
use crate::mesh_pass::{DrawUniforms, MeshPass, PreparedDraw};
use crate::method::TransparencyMethod;
use crate::scene::{Drawable, Scene};
use crate::shader_types::{FrameUniforms, ObjectUniforms, OitParams, ViewMode};
use crate::targets::{FrameTargets, KBufferFormats};

/// The five K-buffer textures of the current frame size.
#[derive(Clone, Copy, Debug)]
pub struct KBufferTargets<'a> {
    pub ac0v0: &'a wgpu::Texture,
    pub ac1v1: &'a wgpu::Texture,
    pub ac2v2: &'a wgpu::Texture,
    pub ac3v3: &'a wgpu::Texture,
    pub d0123: &'a wgpu::Texture,
}

pub struct Renderer {
    method: TransparencyMethod,
    view_mode: ViewMode,
    background: wgpu::Color,
    supports_kbuffer: bool,
    targets: FrameTargets,
    params: wgpu::Buffer,
    mesh_pass: MeshPass,
    kbuffer_pass: KBufferPass,
    composite_pass: CompositePass,
}

impl Renderer {
    pub fn new(gpu: &GpuContext, config: &AppConfig) -> Result<Self> {
        let targets = FrameTargets::new(gpu, config.fragment_capacity)?;

        let params = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("OIT Params"),
            size: std::mem::size_of::<OitParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mesh_pass = MeshPass::new(gpu);
        let supports_kbuffer = gpu.supports_kbuffer && mesh_pass.supports_capture();
        let method = available_method(config.method, supports_kbuffer);
        if method != config.method {
            log::warn!("{} is not supported on this device, using {}", config.method, method);
        }

        let [r, g, b] = config.background;
        let mut renderer = Self {
            method,
            view_mode: ViewMode::default(),
            background: wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: 1.0,
            },
            supports_kbuffer,
            targets,
            params,
            mesh_pass,
            kbuffer_pass: KBufferPass::new(gpu),
            composite_pass: CompositePass::new(gpu),
        };
        renderer.bind_targets(gpu);
        log::info!(
            "renderer ready: {}, {} fragment slots per pixel",
            renderer.method,
            renderer.targets.fragment_capacity()
        );
        Ok(renderer)
    }

    fn bind_targets(&mut self, gpu: &GpuContext) {
        self.mesh_pass.bind_targets(gpu, &self.targets, &self.params);
        self.kbuffer_pass.bind_targets(gpu, &self.targets, &self.params);
        self.composite_pass.bind_targets(gpu, &self.targets, &self.params);
    }

    /// Resizes the surface and every screen-sized target. Zero sizes are
    /// ignored.
    pub fn resize(&mut self, gpu: &mut GpuContext, width: u32, height: u32) -> Result<()> {
        gpu.resize(width, height);
        if self.targets.ensure_size(gpu)? {
            self.bind_targets(gpu);
            log::info!("resized to {}x{}", width, height);
        }
        Ok(())
    }

    /// Renders and presents one frame.
    ///
    /// Lost or outdated surfaces are reconfigured and the frame is skipped,
    /// as are timeouts. Other surface errors are returned.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        scene: &Scene,
        meshes: &MeshLibrary,
        camera: &Camera,
    ) -> Result<()> {
        let output = match gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost or outdated, reconfiguring");
                gpu.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("timed out acquiring the next frame, skipping it");
                return Ok(());
            }
            Err(err) => return Err(Error::Surface(err)),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        self.encode(gpu, &mut encoder, &view, scene, meshes, camera);
        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Records a frame into `encoder`, compositing onto `output`.
    ///
    /// `output` must have the surface format.
    pub fn encode(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        output: &wgpu::TextureView,
        scene: &Scene,
        meshes: &MeshLibrary,
        camera: &Camera,
    ) {
        let (width, height) = self.targets.size();
        let view = camera.view_matrix();
        let projection = camera.projection_matrix(width as f32 / height.max(1) as f32);

        let uniforms: Vec<DrawUniforms> = scene
            .opaque()
            .iter()
            .chain(scene.translucent())
            .map(|drawable| draw_uniforms(drawable, view, projection, width))
            .collect();
        self.mesh_pass.prepare(gpu, &uniforms);

        let opaque = prepared_draws(scene.opaque(), 0);
        let translucent = prepared_draws(scene.translucent(), opaque.len() as u32);

        let params = oit_params(
            self.method.layer_count(),
            self.targets.fragment_capacity(),
            (width, height),
            self.view_mode,
        );
        gpu.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Opaque Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.lighting.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.background),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.mesh_pass.render_opaque(&mut render_pass, meshes, &opaque);
            if !self.method.uses_kbuffer() {
                self.mesh_pass.render_alpha(&mut render_pass, meshes, &translucent);
            }
        }

        if let Some(count) = self.method.layer_count() {
            encoder.clear_buffer(&self.targets.fragment_counts, 0, None);
            {
                // Lighting is attached only because a pass needs a target;
                // the capture pipeline masks every write.
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("K-Buffer Capture Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &self.targets.lighting.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                self.mesh_pass.render_capture(&mut render_pass, meshes, &translucent);
            }
            self.kbuffer_pass.encode(encoder, &self.targets, count);
        }

        self.composite_pass.encode(encoder, output);
    }

    pub fn method(&self) -> TransparencyMethod {
        self.method
    }

    /// Switches the transparency method. K-buffer methods fall back to alpha
    /// blending on devices that cannot capture fragments. Returns the method
    /// now in use.
    pub fn set_method(&mut self, method: TransparencyMethod) -> TransparencyMethod {
        let available = available_method(method, self.supports_kbuffer);
        if available != method {
            log::warn!("{} is not supported on this device", method);
        }
        if available != self.method {
            log::info!("transparency method: {}", available);
            self.method = available;
        }
        self.method
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn set_view_mode(&mut self, view_mode: ViewMode) {
        if view_mode != self.view_mode {
            log::info!("view mode: {}", view_mode.label());
            self.view_mode = view_mode;
        }
    }

    pub fn supports_kbuffer(&self) -> bool {
        self.supports_kbuffer
    }

    pub fn fragment_capacity(&self) -> u32 {
        self.targets.fragment_capacity()
    }

    pub fn kbuffer_formats(&self) -> KBufferFormats {
        KBufferFormats::DEFAULT
    }

    pub fn kbuffer_targets(&self) -> KBufferTargets<'_> {
        let [ac0v0, ac1v1, ac2v2, ac3v3] = &self.targets.layers;
        KBufferTargets {
            ac0v0: &ac0v0.texture,
            ac1v1: &ac1v1.texture,
            ac2v2: &ac2v2.texture,
            ac3v3: &ac3v3.texture,
            d0123: &self.targets.layer_depths.texture,
        }
    }
}

fn available_method(requested: TransparencyMethod, supports_kbuffer: bool) -> TransparencyMethod {
    if requested.uses_kbuffer() && !supports_kbuffer {
        TransparencyMethod::AlphaBlending
    } else {
        requested
    }
}

fn draw_uniforms(
    drawable: &Drawable,
    view: glam::Mat4,
    projection: glam::Mat4,
    screen_width: u32,
) -> DrawUniforms {
    DrawUniforms {
        frame: FrameUniforms::new(view * drawable.transform, projection, view, screen_width),
        object: ObjectUniforms { color: drawable.color },
    }
}

fn prepared_draws(drawables: &[Drawable], first_slot: u32) -> Vec<PreparedDraw> {
    drawables
        .iter()
        .zip(first_slot..)
        .map(|(drawable, slot)| PreparedDraw {
            mesh: drawable.mesh,
            material: drawable.material,
            slot,
        })
        .collect()
}

fn oit_params(
    layers: Option<LayerCount>,
    fragment_capacity: u32,
    size: (u32, u32),
    view_mode: ViewMode,
) -> OitParams {
    OitParams {
        layer_count: layers.map_or(0, |count| count.get() as u32),
        fragment_capacity,
        screen_width: size.0,
        screen_height: size.1,
        view_mode: view_mode as u32,
        _padding: [0; 3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshId;
    use glam::{Mat4, Vec3};

    #[test]
    fn kbuffer_methods_fall_back_without_support() {
        assert_eq!(
            available_method(TransparencyMethod::KBuffer4, false),
            TransparencyMethod::AlphaBlending
        );
        assert_eq!(
            available_method(TransparencyMethod::KBuffer2, true),
            TransparencyMethod::KBuffer2
        );
        assert_eq!(
            available_method(TransparencyMethod::AlphaBlending, false),
            TransparencyMethod::AlphaBlending
        );
    }

    #[test]
    fn params_encode_layer_count() {
        let alpha = oit_params(None, 8, (640, 480), ViewMode::Final);
        assert_eq!(alpha.layer_count, 0);

        let four = oit_params(Some(LayerCount::Four), 6, (640, 480), ViewMode::LayerOccupancy);
        assert_eq!(four.layer_count, 4);
        assert_eq!(four.fragment_capacity, 6);
        assert_eq!((four.screen_width, four.screen_height), (640, 480));
        assert_eq!(four.view_mode, 2);
    }

    #[test]
    fn model_view_combines_view_and_model() {
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let drawable = Drawable::opaque(MeshId(0), Mat4::from_translation(Vec3::X), [1.0; 3]);
        let uniforms = draw_uniforms(&drawable, view, Mat4::IDENTITY, 800);
        assert_eq!(uniforms.frame.model_view_matrix[3], [1.0, 0.0, -5.0, 1.0]);
        assert_eq!(uniforms.frame.view_matrix, view.to_cols_array_2d());
        assert_eq!(uniforms.frame.screen_width, 800);
        assert_eq!(uniforms.object.color, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn translucent_slots_follow_opaque_slots() {
        let drawables = [
            Drawable::translucent(MeshId(1), Mat4::IDENTITY, [1.0; 4]),
            Drawable::translucent(MeshId(2), Mat4::IDENTITY, [1.0; 4]),
        ];
        let draws = prepared_draws(&drawables, 3);
        let slots: Vec<u32> = draws.iter().map(|d| d.slot).collect();
        assert_eq!(slots, vec![3, 4]);
        assert_eq!(draws[1].mesh, MeshId(2));
    }
}

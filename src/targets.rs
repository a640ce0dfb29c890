//! Screen-sized render targets and fragment storage.
//!
//! Everything here is sized to the drawable and recreated by
//! [`FrameTargets::ensure_size`] when the window changes size:
//!
//! - the `Lighting` color target and the opaque depth buffer;
//! - one `AC*V*` target per K-buffer layer (premultiplied color plus
//!   transmittance) and the `D0123` target holding all four layer depths;
//! - the per-pixel fragment counters and fragment slots written by the
//!   capture pass.

use crate::error::{Error, Result};
use crate::gpu::GpuContext;
use crate::kbuffer::MAX_LAYERS;
use crate::shader_types::{ColorAttachment, PackedFragment};

/// Pixel formats of the K-buffer targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KBufferFormats {
    pub ac0v0: wgpu::TextureFormat,
    pub ac1v1: wgpu::TextureFormat,
    pub ac2v2: wgpu::TextureFormat,
    pub ac3v3: wgpu::TextureFormat,
    pub d0123: wgpu::TextureFormat,
}

impl KBufferFormats {
    pub const DEFAULT: KBufferFormats = KBufferFormats {
        ac0v0: LAYER_FORMAT,
        ac1v1: LAYER_FORMAT,
        ac2v2: LAYER_FORMAT,
        ac3v3: LAYER_FORMAT,
        d0123: LAYER_DEPTH_FORMAT,
    };

    pub fn layers(&self) -> [wgpu::TextureFormat; MAX_LAYERS] {
        [self.ac0v0, self.ac1v1, self.ac2v2, self.ac3v3]
    }

    /// Color attachment bytes per sample of the 4-layer build pass, computed
    /// like wgpu's `max_color_attachment_bytes_per_sample` check.
    pub fn attachment_bytes_per_sample(&self) -> u32 {
        self.layers()
            .into_iter()
            .chain(std::iter::once(self.d0123))
            .fold(0, |total, format| {
                let alignment = format.target_component_alignment().unwrap_or(1);
                let cost = format.target_pixel_byte_cost().unwrap_or(0);
                total.next_multiple_of(alignment) + cost
            })
    }
}

pub const LIGHTING_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const LAYER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const LAYER_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// A texture with its default view.
#[derive(Debug)]
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl RenderTarget {
    fn new(
        gpu: &GpuContext,
        label: &str,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Fragment slots per pixel that fit in a storage buffer of `max_bytes`.
///
/// Returns the requested capacity when it fits, otherwise the largest one
/// that does. Fails if not even one fragment per pixel fits.
pub fn fit_fragment_capacity(
    requested: u32,
    width: u32,
    height: u32,
    max_bytes: u64,
) -> Result<u32> {
    let pixels = u64::from(width) * u64::from(height);
    let per_fragment = std::mem::size_of::<PackedFragment>() as u64;
    let fitting = max_bytes / (pixels * per_fragment).max(1);
    if fitting == 0 {
        return Err(Error::ViewportTooLarge {
            width,
            height,
            max_bytes,
        });
    }
    Ok(u64::from(requested.max(1)).min(fitting) as u32)
}

/// All screen-sized resources owned by the renderer.
pub struct FrameTargets {
    pub lighting: RenderTarget,
    pub depth: RenderTarget,
    /// `AC0V0`..`AC3V3`, nearest layer first.
    pub layers: [RenderTarget; MAX_LAYERS],
    pub layer_depths: RenderTarget,
    pub fragment_counts: wgpu::Buffer,
    pub fragments: wgpu::Buffer,
    fragment_capacity: u32,
    requested_capacity: u32,
    width: u32,
    height: u32,
}

impl FrameTargets {
    pub fn new(gpu: &GpuContext, requested_capacity: u32) -> Result<Self> {
        Self::with_size(gpu, gpu.width(), gpu.height(), requested_capacity)
    }

    fn with_size(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        requested_capacity: u32,
    ) -> Result<Self> {
        let limits = gpu.limits();
        let max_bytes =
            u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
        let fragment_capacity =
            fit_fragment_capacity(requested_capacity, width, height, max_bytes)?;
        if fragment_capacity < requested_capacity {
            log::warn!(
                "fragment capacity lowered from {} to {} to fit {}x{} in {} bytes",
                requested_capacity,
                fragment_capacity,
                width,
                height,
                max_bytes
            );
        }

        let formats = KBufferFormats::DEFAULT;
        let layer_labels = ["AC0V0 K-Buffer", "AC1V1 K-Buffer", "AC2V2 K-Buffer", "AC3V3 K-Buffer"];
        let layer_formats = formats.layers();
        let layers = std::array::from_fn(|i| {
            RenderTarget::new(gpu, layer_labels[i], layer_formats[i], width, height)
        });

        let pixels = u64::from(width) * u64::from(height);
        let fragment_counts = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Fragment Counts"),
            size: pixels * std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let fragment_bytes = pixels
            * u64::from(fragment_capacity)
            * std::mem::size_of::<PackedFragment>() as u64;
        let fragments = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Fragments"),
            size: fragment_bytes,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        log::debug!(
            "allocated {}x{} targets, {} fragment slots per pixel ({} bytes)",
            width,
            height,
            fragment_capacity,
            fragment_bytes
        );

        Ok(Self {
            lighting: RenderTarget::new(gpu, "Lighting", LIGHTING_FORMAT, width, height),
            depth: RenderTarget::new(gpu, "Opaque Depth", DEPTH_FORMAT, width, height),
            layers,
            layer_depths: RenderTarget::new(gpu, "D0123 K-Buffer", formats.d0123, width, height),
            fragment_counts,
            fragments,
            fragment_capacity,
            requested_capacity,
            width,
            height,
        })
    }

    /// Recreates everything if the surface size changed. Returns whether
    /// anything was reallocated.
    pub fn ensure_size(&mut self, gpu: &GpuContext) -> Result<bool> {
        let (width, height) = (gpu.width(), gpu.height());
        if (width, height) == (self.width, self.height) || width == 0 || height == 0 {
            return Ok(false);
        }
        *self = Self::with_size(gpu, width, height, self.requested_capacity)?;
        Ok(true)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fragment_capacity(&self) -> u32 {
        self.fragment_capacity
    }

    /// The layer color target written at `attachment`, if it is one.
    pub fn layer(&self, attachment: ColorAttachment) -> Option<&RenderTarget> {
        ColorAttachment::LAYERS
            .iter()
            .position(|layer| *layer == attachment)
            .map(|i| &self.layers[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_kept_when_it_fits() {
        let capacity = fit_fragment_capacity(8, 1920, 1080, 128 << 20).unwrap();
        assert_eq!(capacity, 8);
    }

    #[test]
    fn capacity_lowered_to_fit_limit() {
        // 4K at 8 bytes per fragment: 66 MB per slot.
        let capacity = fit_fragment_capacity(8, 3840, 2160, 128 << 20).unwrap();
        assert_eq!(capacity, 2);
    }

    #[test]
    fn capacity_never_zero() {
        assert_eq!(fit_fragment_capacity(0, 10, 10, 1 << 20).unwrap(), 1);
    }

    #[test]
    fn too_large_viewport_is_an_error() {
        let err = fit_fragment_capacity(4, 4096, 4096, 1 << 20).unwrap_err();
        assert!(matches!(err, Error::ViewportTooLarge { width: 4096, height: 4096, .. }));
    }

    #[test]
    fn default_formats() {
        for format in KBufferFormats::DEFAULT.layers() {
            assert_eq!(format, wgpu::TextureFormat::Rgba16Float);
        }
        assert_eq!(KBufferFormats::DEFAULT.d0123, wgpu::TextureFormat::Rgba32Float);
    }

    #[test]
    fn build_pass_needs_more_than_the_default_attachment_budget() {
        let bytes = KBufferFormats::DEFAULT.attachment_bytes_per_sample();
        assert_eq!(bytes, 4 * 8 + 16);
        assert!(bytes > wgpu::Limits::default().max_color_attachment_bytes_per_sample);
    }
}

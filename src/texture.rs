use crate::gpu::GpuContext;

/// A GPU texture that can be bound to shaders.
#[derive(Debug)]
pub struct Texture {
    #[allow(dead_code)]
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    /// Create a texture from raw RGBA data.
    pub fn from_rgba(gpu: &GpuContext, data: &[u8], width: u32, height: u32, label: &str) -> Self {
        use wgpu::util::DeviceExt;

        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            data,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", label)),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            width,
            height,
        }
    }

    /// A 1x1 white texture, for meshes that are only tinted.
    pub fn white(gpu: &GpuContext) -> Self {
        Self::from_rgba(gpu, &[255, 255, 255, 255], 1, 1, "White Texture")
    }

    /// A two-tone checkerboard used as the base color of the sample scene.
    pub fn checkerboard(gpu: &GpuContext, size: u32, cells: u32) -> Self {
        let data = checkerboard_rgba(size, cells, [235, 235, 235, 255], [90, 90, 100, 255]);
        Self::from_rgba(gpu, &data, size, size, "Checkerboard Texture")
    }
}

/// RGBA8 pixels of a `size`×`size` checkerboard with `cells` cells per side.
fn checkerboard_rgba(size: u32, cells: u32, light: [u8; 4], dark: [u8; 4]) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1);
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let color = if ((x / cell) + (y / cell)) % 2 == 0 {
                light
            } else {
                dark
            };
            data.extend_from_slice(&color);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_alternates_cells() {
        let light = [255, 255, 255, 255];
        let dark = [0, 0, 0, 255];
        let data = checkerboard_rgba(4, 2, light, dark);
        assert_eq!(data.len(), 4 * 4 * 4);

        let texel = |x: usize, y: usize| &data[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(texel(0, 0), &light);
        assert_eq!(texel(1, 1), &light);
        assert_eq!(texel(2, 0), &dark);
        assert_eq!(texel(0, 2), &dark);
        assert_eq!(texel(3, 3), &light);
    }

    #[test]
    fn checkerboard_tolerates_more_cells_than_pixels() {
        let data = checkerboard_rgba(2, 16, [1; 4], [2; 4]);
        assert_eq!(&data[0..4], &[1; 4]);
        assert_eq!(&data[4..8], &[2; 4]);
    }
}

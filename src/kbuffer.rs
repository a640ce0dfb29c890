//! Bounded per-pixel fragment storage and its resolve.
//!
//! This is the host-side counterpart of `shaders/kbuffer_build.wgsl` and
//! `shaders/composite.wgsl`. Both sides implement multi-layer alpha blending:
//!
//! - every fragment is turned into a [`Layer`] holding premultiplied color,
//!   transmittance (`1 - alpha`) and depth;
//! - a pixel keeps at most K layers sorted nearest first;
//! - when a fragment arrives at a full pixel, the two farthest layers are
//!   merged into one, so the front of the list stays exact while the tail is
//!   approximated;
//! - the resolve walks the layers front to back and composites the result
//!   over the opaque background.
//!
//! With at most K fragments per pixel the result is identical to sorting all
//! fragments by depth, no matter what order they arrived in.
//!
//! ```
//! use strata::kbuffer::{Fragment, KBuffer, LayerCount};
//!
//! let mut pixel = KBuffer::new(LayerCount::Four);
//! pixel.insert(Fragment::new([0.0, 0.0, 1.0, 0.5], 0.8));
//! pixel.insert(Fragment::new([1.0, 0.0, 0.0, 0.5], 0.2));
//!
//! // The red fragment is nearer, so it dominates.
//! let color = pixel.resolve([0.0, 0.0, 0.0]);
//! assert!(color[0] > color[2]);
//! ```

/// Depth of an unoccupied layer. Matches the cleared depth buffer value.
pub const FAR_DEPTH: f32 = 1.0;

/// Largest supported layer count. The GPU targets are always allocated for
/// this many layers so switching methods never reallocates.
pub const MAX_LAYERS: usize = 4;

/// Number of layers kept per pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerCount {
    Two,
    Four,
}

impl LayerCount {
    pub fn get(self) -> usize {
        match self {
            LayerCount::Two => 2,
            LayerCount::Four => 4,
        }
    }
}

/// A shaded translucent fragment: straight (non-premultiplied) RGBA plus
/// window-space depth in `[0, 1]`, smaller is nearer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fragment {
    pub color: [f32; 4],
    pub depth: f32,
}

impl Fragment {
    pub fn new(color: [f32; 4], depth: f32) -> Self {
        Self { color, depth }
    }

    /// Packs the color the way the capture shader stores it (`pack4x8unorm`).
    pub fn packed_color(&self) -> u32 {
        self.color
            .iter()
            .enumerate()
            .fold(0u32, |bits, (i, channel)| {
                let byte = (channel.clamp(0.0, 1.0) * 255.0).round() as u32;
                bits | (byte << (8 * i))
            })
    }

    /// Inverse of [`Fragment::packed_color`] (`unpack4x8unorm`).
    pub fn from_packed(packed: u32, depth: f32) -> Self {
        let mut color = [0.0; 4];
        for (i, channel) in color.iter_mut().enumerate() {
            *channel = ((packed >> (8 * i)) & 0xff) as f32 / 255.0;
        }
        Self { color, depth }
    }
}

/// One resolved layer of a pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layer {
    /// Premultiplied color.
    pub color: [f32; 3],
    /// Fraction of the light behind this layer that passes through.
    pub transmittance: f32,
    pub depth: f32,
}

impl Layer {
    pub const EMPTY: Layer = Layer {
        color: [0.0; 3],
        transmittance: 1.0,
        depth: FAR_DEPTH,
    };

    pub fn is_empty(&self) -> bool {
        self.depth >= FAR_DEPTH
    }

    /// Composites `back` behind `self`, keeping `self`'s depth.
    pub fn merge(self, back: Layer) -> Layer {
        Layer {
            color: [
                self.color[0] + back.color[0] * self.transmittance,
                self.color[1] + back.color[1] * self.transmittance,
                self.color[2] + back.color[2] * self.transmittance,
            ],
            transmittance: self.transmittance * back.transmittance,
            depth: self.depth,
        }
    }

    /// Texel layout of an `AC*V*` target: premultiplied rgb, transmittance in a.
    pub fn to_texel(&self) -> [f32; 4] {
        [self.color[0], self.color[1], self.color[2], self.transmittance]
    }
}

impl From<Fragment> for Layer {
    fn from(fragment: Fragment) -> Self {
        let [r, g, b, a] = fragment.color;
        let a = a.clamp(0.0, 1.0);
        Layer {
            color: [r * a, g * a, b * a],
            transmittance: 1.0 - a,
            depth: fragment.depth,
        }
    }
}

/// A single pixel's K-buffer.
#[derive(Clone, Debug)]
pub struct KBuffer {
    count: LayerCount,
    // One scratch slot past the last layer receives the overflow before merging.
    slots: [Layer; MAX_LAYERS + 1],
}

impl KBuffer {
    pub fn new(count: LayerCount) -> Self {
        Self {
            count,
            slots: [Layer::EMPTY; MAX_LAYERS + 1],
        }
    }

    pub fn layer_count(&self) -> LayerCount {
        self.count
    }

    /// Inserts a fragment, merging the two farthest layers if the pixel is full.
    ///
    /// Ties in depth keep arrival order. Fully transparent fragments are
    /// dropped, as the capture pass discards them.
    pub fn insert(&mut self, fragment: Fragment) {
        if fragment.color[3] <= 0.0 {
            return;
        }
        let k = self.count.get();
        let mut incoming = Layer::from(fragment);

        for slot in &mut self.slots[..=k] {
            if incoming.depth < slot.depth {
                std::mem::swap(slot, &mut incoming);
            }
        }

        self.slots[k - 1] = self.slots[k - 1].merge(self.slots[k]);
        self.slots[k] = Layer::EMPTY;
    }

    /// The K layers, nearest first. Unused layers are [`Layer::EMPTY`].
    pub fn layers(&self) -> &[Layer] {
        &self.slots[..self.count.get()]
    }

    /// Number of occupied layers.
    pub fn occupied(&self) -> usize {
        self.layers().iter().filter(|layer| !layer.is_empty()).count()
    }

    pub fn total_transmittance(&self) -> f32 {
        self.layers().iter().map(|layer| layer.transmittance).product()
    }

    /// Composites the layers front to back over an opaque `background`.
    pub fn resolve(&self, background: [f32; 3]) -> [f32; 3] {
        resolve_layers(self.layers(), background)
    }

    pub fn clear(&mut self) {
        self.slots = [Layer::EMPTY; MAX_LAYERS + 1];
    }
}

/// Front-to-back composite of nearest-first layers over `background`.
pub fn resolve_layers(layers: &[Layer], background: [f32; 3]) -> [f32; 3] {
    let mut color = [0.0f32; 3];
    let mut transmittance = 1.0f32;
    for layer in layers {
        for (out, c) in color.iter_mut().zip(layer.color) {
            *out += transmittance * c;
        }
        transmittance *= layer.transmittance;
    }
    [
        color[0] + transmittance * background[0],
        color[1] + transmittance * background[1],
        color[2] + transmittance * background[2],
    ]
}

/// Conventional "over" blending in submission order, as the alpha pass does.
pub fn alpha_blend(fragments: &[Fragment], background: [f32; 3]) -> [f32; 3] {
    fragments.iter().fold(background, |dst, fragment| {
        let layer = Layer::from(*fragment);
        [
            layer.color[0] + dst[0] * layer.transmittance,
            layer.color[1] + dst[1] * layer.transmittance,
            layer.color[2] + dst[2] * layer.transmittance,
        ]
    })
}

/// Exact compositing: sort every fragment by depth, then resolve.
pub fn sorted_composite(fragments: &[Fragment], background: [f32; 3]) -> [f32; 3] {
    let mut layers: Vec<Layer> = fragments.iter().copied().map(Layer::from).collect();
    layers.sort_by(|a, b| a.depth.total_cmp(&b.depth));
    resolve_layers(&layers, background)
}

/// A K-buffer per pixel over a whole viewport, mirroring the GPU targets.
///
/// Useful for producing reference images and for inspecting what the build
/// pass writes into the `AC*V*` / `D0123` textures.
#[derive(Clone, Debug)]
pub struct KBufferImage {
    width: u32,
    height: u32,
    count: LayerCount,
    pixels: Vec<KBuffer>,
}

impl KBufferImage {
    pub fn new(width: u32, height: u32, count: LayerCount) -> Self {
        Self {
            width,
            height,
            count,
            pixels: vec![KBuffer::new(count); (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reallocates for a new size, dropping all stored layers. Zero sizes are
    /// ignored, as with the GPU targets.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == (self.width, self.height) {
            return;
        }
        *self = Self::new(width, height, self.count);
    }

    /// Linear pixel index, `y * width + x`, as computed by the capture shader.
    pub fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize) * (self.width as usize) + x as usize)
    }

    /// Inserts a fragment at `(x, y)`. Out-of-bounds fragments are ignored.
    ///
    /// The color is quantized to RGBA8 first, as the capture pass stores it.
    pub fn insert(&mut self, x: u32, y: u32, fragment: Fragment) {
        if let Some(index) = self.index(x, y) {
            let stored = Fragment::from_packed(fragment.packed_color(), fragment.depth);
            self.pixels[index].insert(stored);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&KBuffer> {
        self.index(x, y).map(|index| &self.pixels[index])
    }

    pub fn resolve_pixel(&self, x: u32, y: u32, background: [f32; 3]) -> Option<[f32; 3]> {
        self.pixel(x, y).map(|pixel| pixel.resolve(background))
    }

    /// The texels the build pass writes for one pixel: the four `AC*V*`
    /// values and the packed `D0123` depths. Layers past the layer count
    /// are empty.
    pub fn layer_texels(&self, x: u32, y: u32) -> Option<([[f32; 4]; MAX_LAYERS], [f32; 4])> {
        let pixel = self.pixel(x, y)?;
        let mut colors = [Layer::EMPTY.to_texel(); MAX_LAYERS];
        let mut depths = [FAR_DEPTH; MAX_LAYERS];
        for (i, layer) in pixel.layers().iter().enumerate() {
            colors[i] = layer.to_texel();
            depths[i] = layer.depth;
        }
        Some((colors, depths))
    }

    pub fn clear(&mut self) {
        self.pixels.iter_mut().for_each(KBuffer::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [f32; 3] = [0.0, 0.0, 0.0];
    const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

    fn assert_close(a: [f32; 3], b: [f32; 3]) {
        for i in 0..3 {
            assert!(
                (a[i] - b[i]).abs() < 1e-5,
                "channel {i} differs: {a:?} vs {b:?}"
            );
        }
    }

    fn sample_fragments() -> Vec<Fragment> {
        vec![
            Fragment::new([1.0, 0.0, 0.0, 0.5], 0.30),
            Fragment::new([0.0, 1.0, 0.0, 0.4], 0.10),
            Fragment::new([0.0, 0.0, 1.0, 0.7], 0.60),
            Fragment::new([1.0, 1.0, 0.0, 0.3], 0.45),
            Fragment::new([0.0, 1.0, 1.0, 0.6], 0.20),
            Fragment::new([1.0, 0.0, 1.0, 0.5], 0.90),
        ]
    }

    fn filled(count: LayerCount, fragments: &[Fragment]) -> KBuffer {
        let mut kbuffer = KBuffer::new(count);
        for fragment in fragments {
            kbuffer.insert(*fragment);
        }
        kbuffer
    }

    #[test]
    fn empty_buffer_shows_background() {
        let kbuffer = KBuffer::new(LayerCount::Four);
        assert_eq!(kbuffer.occupied(), 0);
        assert_close(kbuffer.resolve([0.2, 0.3, 0.4]), [0.2, 0.3, 0.4]);
    }

    #[test]
    fn within_capacity_matches_sorted_in_any_order() {
        let all = sample_fragments();
        let fragments = &all[..4];
        let expected = sorted_composite(fragments, WHITE);

        let mut reversed = fragments.to_vec();
        reversed.reverse();
        let rotated: Vec<_> = fragments[2..].iter().chain(&fragments[..2]).copied().collect();

        for order in [fragments.to_vec(), reversed, rotated] {
            let kbuffer = filled(LayerCount::Four, &order);
            assert_eq!(kbuffer.occupied(), 4);
            assert_close(kbuffer.resolve(WHITE), expected);
        }
    }

    #[test]
    fn two_layers_exact_for_two_fragments() {
        let all = sample_fragments();
        let fragments = &all[..2];
        let kbuffer = filled(LayerCount::Two, &[fragments[1], fragments[0]]);
        assert_close(kbuffer.resolve(BLACK), sorted_composite(fragments, BLACK));
    }

    #[test]
    fn layers_are_sorted_nearest_first() {
        let all = sample_fragments();
        let kbuffer = filled(LayerCount::Four, &all[..4]);
        let depths: Vec<f32> = kbuffer.layers().iter().map(|l| l.depth).collect();
        assert_eq!(depths, vec![0.10, 0.30, 0.45, 0.60]);
    }

    #[test]
    fn overflow_merges_the_farthest_layers() {
        let fragments = sample_fragments();
        let kbuffer = filled(LayerCount::Four, &fragments);

        assert_eq!(kbuffer.occupied(), 4);
        let layers = kbuffer.layers();
        // The three nearest fragments overall stay untouched.
        assert_eq!(layers[0].depth, 0.10);
        assert_eq!(layers[1].depth, 0.20);
        assert_eq!(layers[2].depth, 0.30);
        // Everything else collapsed into the last layer.
        assert_eq!(layers[3].depth, 0.45);
        let tail_transmittance = (1.0 - 0.3) * (1.0 - 0.7) * (1.0 - 0.5);
        assert!((layers[3].transmittance - tail_transmittance).abs() < 1e-6);
    }

    #[test]
    fn overflow_is_exact_when_arriving_back_to_front() {
        // Merging the farthest pair only loses information when a nearer
        // fragment arrives after the merge; back-to-front arrival never does.
        let mut fragments = sample_fragments();
        fragments.sort_by(|a, b| b.depth.total_cmp(&a.depth));
        let kbuffer = filled(LayerCount::Two, &fragments);
        assert_close(kbuffer.resolve(WHITE), sorted_composite(&fragments, WHITE));
    }

    #[test]
    fn total_transmittance_is_order_independent() {
        let fragments = sample_fragments();
        let expected: f32 = fragments.iter().map(|f| 1.0 - f.color[3]).product();

        for count in [LayerCount::Two, LayerCount::Four] {
            let forward = filled(count, &fragments);
            let mut reversed = fragments.clone();
            reversed.reverse();
            let backward = filled(count, &reversed);
            assert!((forward.total_transmittance() - expected).abs() < 1e-6);
            assert!((backward.total_transmittance() - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn four_layers_beat_two_layers_on_deep_pixels() {
        let fragments = sample_fragments();
        let exact = sorted_composite(&fragments, WHITE);
        let error = |c: [f32; 3]| (0..3).map(|i| (c[i] - exact[i]).abs()).sum::<f32>();

        let two = filled(LayerCount::Two, &fragments).resolve(WHITE);
        let four = filled(LayerCount::Four, &fragments).resolve(WHITE);
        assert!(error(four) <= error(two));
    }

    #[test]
    fn alpha_blending_depends_on_submission_order() {
        let near = Fragment::new([1.0, 0.0, 0.0, 0.8], 0.1);
        let far = Fragment::new([0.0, 0.0, 1.0, 0.8], 0.9);

        let back_to_front = alpha_blend(&[far, near], BLACK);
        let front_to_back = alpha_blend(&[near, far], BLACK);
        assert_close(back_to_front, sorted_composite(&[near, far], BLACK));
        assert!(front_to_back[2] > back_to_front[2]);

        let kbuffer = filled(LayerCount::Two, &[near, far]);
        assert_close(kbuffer.resolve(BLACK), back_to_front);
    }

    #[test]
    fn transparent_fragment_changes_nothing() {
        let all = sample_fragments();
        let mut kbuffer = filled(LayerCount::Four, &all[..2]);
        let before = kbuffer.resolve(WHITE);
        kbuffer.insert(Fragment::new([1.0, 0.0, 1.0, 0.0], 0.05));
        assert_close(kbuffer.resolve(WHITE), before);
    }

    #[test]
    fn transparent_fragment_takes_no_layer() {
        let fragments = [
            Fragment::new([1.0, 0.0, 0.0, 0.5], 0.2),
            Fragment::new([0.0, 1.0, 0.0, 0.5], 0.8),
            Fragment::new([0.0, 0.0, 1.0, 0.5], 0.5),
        ];
        let without = filled(LayerCount::Two, &fragments);

        let mut with = KBuffer::new(LayerCount::Two);
        with.insert(Fragment::new([1.0, 1.0, 1.0, 0.0], 0.1));
        for fragment in fragments {
            with.insert(fragment);
        }

        assert_eq!(with.occupied(), without.occupied());
        assert_close(with.resolve(BLACK), without.resolve(BLACK));
        assert_close(with.resolve(BLACK), sorted_composite(&fragments, BLACK));
    }

    #[test]
    fn image_stores_colors_as_rgba8() {
        let fragment = Fragment::new([0.3, 0.6, 0.9, 0.5], 0.4);
        let mut image = KBufferImage::new(1, 1, LayerCount::Four);
        image.insert(0, 0, fragment);

        let quantized = Fragment::from_packed(fragment.packed_color(), fragment.depth);
        let mut expected = KBuffer::new(LayerCount::Four);
        expected.insert(quantized);
        let (colors, _) = image.layer_texels(0, 0).unwrap();
        assert_eq!(colors[0], expected.layers()[0].to_texel());
        assert_eq!(image.resolve_pixel(0, 0, WHITE), Some(expected.resolve(WHITE)));
    }

    #[test]
    fn opaque_fragment_hides_everything_behind() {
        let mut fragments = sample_fragments()[..3].to_vec();
        fragments.push(Fragment::new([0.25, 0.5, 0.75, 1.0], 0.01));
        let kbuffer = filled(LayerCount::Four, &fragments);
        assert_close(kbuffer.resolve(WHITE), [0.25, 0.5, 0.75]);
        assert_eq!(kbuffer.total_transmittance(), 0.0);
    }

    #[test]
    fn equal_depths_keep_arrival_order() {
        let first = Fragment::new([1.0, 0.0, 0.0, 0.5], 0.5);
        let second = Fragment::new([0.0, 1.0, 0.0, 0.5], 0.5);
        let kbuffer = filled(LayerCount::Four, &[first, second]);
        assert_eq!(kbuffer.layers()[0].color, [0.5, 0.0, 0.0]);
        assert_eq!(kbuffer.layers()[1].color, [0.0, 0.5, 0.0]);
    }

    #[test]
    fn packed_color_matches_unorm8() {
        let fragment = Fragment::new([1.0, 0.5, 0.0, 0.25], 0.3);
        let packed = fragment.packed_color();
        assert_eq!(packed & 0xff, 255);
        assert_eq!((packed >> 8) & 0xff, 128);
        assert_eq!((packed >> 16) & 0xff, 0);
        assert_eq!(packed >> 24, 64);

        let unpacked = Fragment::from_packed(packed, 0.3);
        for (a, b) in unpacked.color.iter().zip(fragment.color) {
            assert!((a - b).abs() <= 0.5 / 255.0 + 1e-6);
        }
    }

    #[test]
    fn image_indexes_row_major() {
        let image = KBufferImage::new(4, 3, LayerCount::Two);
        assert_eq!(image.index(0, 0), Some(0));
        assert_eq!(image.index(3, 0), Some(3));
        assert_eq!(image.index(1, 2), Some(9));
        assert_eq!(image.index(4, 0), None);
        assert_eq!(image.index(0, 3), None);
    }

    #[test]
    fn image_pixels_are_independent() {
        let mut image = KBufferImage::new(2, 2, LayerCount::Four);
        image.insert(1, 1, Fragment::new([1.0, 1.0, 1.0, 1.0], 0.5));
        image.insert(5, 5, Fragment::new([1.0, 1.0, 1.0, 1.0], 0.5));

        assert_eq!(image.resolve_pixel(0, 0, BLACK), Some(BLACK));
        assert_eq!(image.resolve_pixel(1, 1, BLACK), Some(WHITE));
        assert_eq!(image.resolve_pixel(2, 0, BLACK), None);
    }

    #[test]
    fn layer_texels_pad_unused_layers() {
        let mut image = KBufferImage::new(1, 1, LayerCount::Two);
        image.insert(0, 0, Fragment::new([1.0, 0.0, 0.0, 1.0], 0.25));

        let (colors, depths) = image.layer_texels(0, 0).unwrap();
        assert_eq!(colors[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(colors[1], Layer::EMPTY.to_texel());
        assert_eq!(colors[3], Layer::EMPTY.to_texel());
        assert_eq!(depths, [0.25, FAR_DEPTH, FAR_DEPTH, FAR_DEPTH]);
    }

    #[test]
    fn resize_ignores_zero_and_drops_contents() {
        let mut image = KBufferImage::new(2, 2, LayerCount::Four);
        image.insert(0, 0, Fragment::new([1.0, 0.0, 0.0, 1.0], 0.5));

        image.resize(0, 10);
        assert_eq!((image.width(), image.height()), (2, 2));
        assert_eq!(image.pixel(0, 0).unwrap().occupied(), 1);

        image.resize(3, 1);
        assert_eq!((image.width(), image.height()), (3, 1));
        assert_eq!(image.pixel(0, 0).unwrap().occupied(), 0);
    }
}

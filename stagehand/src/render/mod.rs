//! # Render context and targets
//!
//! The context stands in for the thread-affine GPU device the real renderer
//! would own: it may only be created, used and destroyed on the worker thread,
//! and every render target it creates is backed by its own pixel storage.
//! Rasterization proper is the orchestrated library's job, so drawing an
//! artboard reduces to transforming its bounds and filling them, enough to
//! exercise every lifecycle, transform and readback path the server owns.

pub mod fit;

pub use fit::{Alignment, Fit};

use cgmath::{Matrix3, SquareMatrix, Vector3};
use stagehand_core::scene::Artboard;
use stagehand_core::value::Color;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("invalid context options: {0}")]
    InvalidOptions(String),
    #[error("render target {width}x{height} exceeds the context limit of {max}")]
    TargetTooLarge { width: u32, height: u32, max: u32 },
    #[error("render target dimensions must be non-zero")]
    ZeroSized,
    #[error("readback buffer holds {got} bytes, target needs {needed}")]
    BufferSize { needed: usize, got: usize },
}

/// Knobs for context creation. Validated during the startup handshake, so a
/// bad configuration fails server construction synchronously.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Largest allowed render-target edge, in pixels.
    pub max_target_dim: u32,
    /// Multisample counts the context accepts.
    pub sample_counts: &'static [u32],
}
impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_target_dim: 8192,
            sample_counts: &[1, 4],
        }
    }
}

/// The thread-affine rendering device. Construction happens as the first act
/// of the worker thread; the stored thread id backs a debug assertion on
/// every use so a misrouted call fails loudly in development.
pub struct RenderContext {
    thread: std::thread::ThreadId,
    options: ContextOptions,
    frames_presented: u64,
}
impl RenderContext {
    pub fn new(options: &ContextOptions) -> Result<Self, ContextError> {
        if options.max_target_dim == 0 {
            return Err(ContextError::InvalidOptions(
                "max_target_dim must be non-zero".to_owned(),
            ));
        }
        if options.sample_counts.is_empty() {
            return Err(ContextError::InvalidOptions(
                "at least one sample count is required".to_owned(),
            ));
        }
        Ok(Self {
            thread: std::thread::current().id(),
            options: options.clone(),
            frames_presented: 0,
        })
    }
    fn assert_thread(&self) {
        debug_assert_eq!(
            std::thread::current().id(),
            self.thread,
            "render context used off its owning thread"
        );
    }
    /// Create a target surface. Requested sample counts the context doesn't
    /// support are clamped to the nearest supported one: down when possible,
    /// up to the minimum supported count otherwise.
    pub fn create_target(
        &self,
        width: u32,
        height: u32,
        samples: u32,
    ) -> Result<RenderTarget, ContextError> {
        self.assert_thread();
        if width == 0 || height == 0 {
            return Err(ContextError::ZeroSized);
        }
        let max = self.options.max_target_dim;
        if width > max || height > max {
            return Err(ContextError::TargetTooLarge { width, height, max });
        }
        let requested = samples.max(1);
        let samples = self
            .options
            .sample_counts
            .iter()
            .copied()
            .filter(|&s| s <= requested)
            .max()
            .or_else(|| self.options.sample_counts.iter().copied().min())
            // sample_counts was validated non-empty at construction.
            .unwrap_or(1);
        Ok(RenderTarget {
            width,
            height,
            samples,
            pixels: vec![[0; 4]; width as usize * height as usize],
        })
    }
    /// Finish a frame ("swap buffers" for a headless surface).
    pub fn present(&mut self) {
        self.assert_thread();
        self.frames_presented += 1;
    }
    #[must_use]
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

/// A sized destination for draw output. Must only be touched on the thread
/// that owns the creating context.
pub struct RenderTarget {
    width: u32,
    height: u32,
    samples: u32,
    pixels: Vec<[u8; 4]>,
}
impl RenderTarget {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn samples(&self) -> u32 {
        self.samples
    }
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixels.len() * 4
    }
    pub fn clear(&mut self, color: Color) {
        self.pixels.fill(color.to_rgba8());
    }
    /// Flip rows for bottom-left-origin consumers.
    pub fn flip_vertical(&mut self) {
        let width = self.width as usize;
        let (mut top, mut bottom) = (0, self.height as usize - 1);
        while top < bottom {
            for x in 0..width {
                self.pixels.swap(top * width + x, bottom * width + x);
            }
            top += 1;
            bottom -= 1;
        }
    }
    /// Copy RGBA8 rows into a caller-provided buffer, optionally flipped.
    pub fn read_into(&self, buffer: &mut [u8], flip: bool) -> Result<(), ContextError> {
        let needed = self.byte_len();
        if buffer.len() != needed {
            return Err(ContextError::BufferSize {
                needed,
                got: buffer.len(),
            });
        }
        let bytes: &[u8] = bytemuck::cast_slice(&self.pixels);
        if flip {
            let stride = self.width as usize * 4;
            for (row, chunk) in buffer.chunks_exact_mut(stride).enumerate() {
                let src = (self.height as usize - 1 - row) * stride;
                chunk.copy_from_slice(&bytes[src..src + stride]);
            }
        } else {
            buffer.copy_from_slice(bytes);
        }
        Ok(())
    }
    /// Readback into a fresh buffer, for asynchronous delivery.
    #[must_use]
    pub fn to_bytes(&self, flip: bool) -> Box<[u8]> {
        let mut buffer = vec![0; self.byte_len()];
        // Length matches by construction.
        let _ = self.read_into(&mut buffer, flip);
        buffer.into_boxed_slice()
    }
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        (x < self.width && y < self.height)
            .then(|| self.pixels[(y * self.width + x) as usize])
    }
}

/// Fill the artboard's transformed bounds with its background color.
///
/// Every target pixel center is mapped through the inverse transform and
/// written when it lands inside the artboard. A non-invertible transform draws
/// nothing.
pub fn draw_artboard(target: &mut RenderTarget, artboard: &Artboard, transform: Matrix3<f32>) {
    let Some(inverse) = transform.invert() else {
        return;
    };
    let color = artboard.background().to_rgba8();
    let (bw, bh) = (artboard.width(), artboard.height());
    let width = target.width as usize;
    for y in 0..target.height {
        for x in 0..target.width {
            let local = inverse * Vector3::new(x as f32 + 0.5, y as f32 + 0.5, 1.0);
            if local.x >= 0.0 && local.x < bw && local.y >= 0.0 && local.y < bh {
                target.pixels[y as usize * width + x as usize] = color;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{draw_artboard, fit, Alignment, ContextError, ContextOptions, Fit, RenderContext};
    use stagehand_core::scene::{Artboard, ArtboardDescriptor, DocumentDescriptor, File};
    use stagehand_core::value::Color;
    use std::sync::Arc;

    fn context() -> RenderContext {
        RenderContext::new(&ContextOptions::default()).unwrap()
    }
    fn artboard(width: f32, height: f32, background: Color) -> Artboard {
        let descriptor = ArtboardDescriptor {
            name: "ab".into(),
            width,
            height,
            background,
            machines: Vec::new(),
            animations: Vec::new(),
        };
        let file = Arc::new(
            File::import(
                &DocumentDescriptor {
                    artboards: vec![descriptor.clone()],
                    ..Default::default()
                }
                .to_bytes()
                .unwrap(),
            )
            .unwrap(),
        );
        Artboard::instantiate(&file, &descriptor)
    }

    #[test]
    fn context_validates_options() {
        assert!(matches!(
            RenderContext::new(&ContextOptions {
                max_target_dim: 0,
                ..Default::default()
            }),
            Err(ContextError::InvalidOptions(_))
        ));
    }
    #[test]
    fn target_creation_limits() {
        let ctx = context();
        assert!(matches!(
            ctx.create_target(0, 8, 1),
            Err(ContextError::ZeroSized)
        ));
        assert!(matches!(
            ctx.create_target(10_000, 8, 1),
            Err(ContextError::TargetTooLarge { .. })
        ));
        // Unsupported sample count clamps down.
        let target = ctx.create_target(8, 8, 16).unwrap();
        assert_eq!(target.samples(), 4);
    }
    #[test]
    fn sample_counts_clamp_to_supported() {
        // No supported count at or below the request: clamp up, so the
        // returned target never claims a count the context cannot back.
        let ctx = RenderContext::new(&ContextOptions {
            sample_counts: &[4],
            ..Default::default()
        })
        .unwrap();
        let target = ctx.create_target(8, 8, 1).unwrap();
        assert_eq!(target.samples(), 4);
    }
    #[test]
    fn contain_draw_letterboxes() {
        let ctx = context();
        let mut target = ctx.create_target(8, 8, 1).unwrap();
        target.clear(Color::BLACK);
        // 2:1 artboard contained in a square target: top and bottom quarters
        // stay letterboxed.
        let board = artboard(100.0, 50.0, Color::WHITE);
        let transform = fit::compute(
            Fit::Contain,
            Alignment::CENTER,
            (board.width(), board.height()),
            (8.0, 8.0),
        );
        draw_artboard(&mut target, &board, transform);
        assert_eq!(target.pixel(4, 0).unwrap(), Color::BLACK.to_rgba8());
        assert_eq!(target.pixel(4, 4).unwrap(), Color::WHITE.to_rgba8());
        assert_eq!(target.pixel(4, 7).unwrap(), Color::BLACK.to_rgba8());
    }
    #[test]
    fn readback_flip() {
        let ctx = context();
        let mut target = ctx.create_target(2, 2, 1).unwrap();
        target.clear(Color::BLACK);
        // Paint the top row white via a half-height artboard.
        let board = artboard(2.0, 1.0, Color::WHITE);
        let transform = fit::compute(
            Fit::None,
            Alignment::TOP_LEFT,
            (board.width(), board.height()),
            (2.0, 2.0),
        );
        draw_artboard(&mut target, &board, transform);

        let straight = target.to_bytes(false);
        let flipped = target.to_bytes(true);
        assert_eq!(&straight[0..4], &Color::WHITE.to_rgba8());
        assert_eq!(&straight[8..12], &Color::BLACK.to_rgba8());
        assert_eq!(&flipped[0..4], &Color::BLACK.to_rgba8());
        assert_eq!(&flipped[8..12], &Color::WHITE.to_rgba8());

        let mut wrong = vec![0; 3];
        assert!(matches!(
            target.read_into(&mut wrong, false),
            Err(ContextError::BufferSize { .. })
        ));
    }
}

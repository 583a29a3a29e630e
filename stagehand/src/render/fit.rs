//! Fit and alignment transforms mapping artboard space into a destination
//! rectangle.

use cgmath::Matrix3;

/// How content scales to its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fit {
    /// Largest uniform scale that fits entirely inside the destination.
    #[default]
    Contain,
    /// Smallest uniform scale that covers the destination entirely.
    Cover,
    /// Non-uniform stretch to exactly the destination.
    Fill,
    /// Uniform scale matching widths.
    FitWidth,
    /// Uniform scale matching heights.
    FitHeight,
    /// No scaling at all.
    None,
    /// Contain, but never scale up.
    ScaleDown,
}

/// Where content sits inside the destination, per axis, in `-1..=1`
/// (`-1` = start edge, `0` = centered, `1` = end edge).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    pub x: f32,
    pub y: f32,
}
impl Alignment {
    pub const CENTER: Self = Self { x: 0.0, y: 0.0 };
    pub const TOP_LEFT: Self = Self { x: -1.0, y: -1.0 };
    pub const TOP_CENTER: Self = Self { x: 0.0, y: -1.0 };
    pub const BOTTOM_RIGHT: Self = Self { x: 1.0, y: 1.0 };
}
impl Default for Alignment {
    fn default() -> Self {
        Self::CENTER
    }
}

/// Compute the affine transform taking `content` space (origin at its top
/// left) into a `frame`-sized destination. Degenerate content collapses to the
/// identity scale rather than producing NaNs.
#[must_use]
pub fn compute(
    fit: Fit,
    alignment: Alignment,
    content: (f32, f32),
    frame: (f32, f32),
) -> Matrix3<f32> {
    let (cw, ch) = content;
    let (fw, fh) = frame;
    let safe = |num: f32, den: f32| if den > 0.0 { num / den } else { 1.0 };
    let sx_fill = safe(fw, cw);
    let sy_fill = safe(fh, ch);
    let (sx, sy) = match fit {
        Fit::Fill => (sx_fill, sy_fill),
        Fit::Contain => {
            let s = sx_fill.min(sy_fill);
            (s, s)
        }
        Fit::Cover => {
            let s = sx_fill.max(sy_fill);
            (s, s)
        }
        Fit::FitWidth => (sx_fill, sx_fill),
        Fit::FitHeight => (sy_fill, sy_fill),
        Fit::None => (1.0, 1.0),
        Fit::ScaleDown => {
            let s = sx_fill.min(sy_fill).min(1.0);
            (s, s)
        }
    };
    // Distribute the leftover space according to alignment.
    let tx = (fw - cw * sx) * (alignment.x + 1.0) * 0.5;
    let ty = (fh - ch * sy) * (alignment.y + 1.0) * 0.5;
    // Column-major: scale then translate.
    Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, tx, ty, 1.0)
}

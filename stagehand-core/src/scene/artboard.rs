//! Artboard instances.

use std::sync::Arc;

use super::{ArtboardDescriptor, File};
use crate::value::Color;

/// An instantiated drawable region of a document.
///
/// Size is mutable for layout-fit scenarios. The artboard keeps its source
/// file alive through an `Arc`, so deleting the file from the server's table
/// does not retroactively invalidate artboards already created from it.
pub struct Artboard {
    name: String,
    width: f32,
    height: f32,
    background: Color,
    source: Arc<File>,
}
impl Artboard {
    #[must_use]
    pub fn instantiate(source: &Arc<File>, descriptor: &ArtboardDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            width: descriptor.width,
            height: descriptor.height,
            background: descriptor.background,
            source: source.clone(),
        }
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn width(&self) -> f32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> f32 {
        self.height
    }
    #[must_use]
    pub fn background(&self) -> Color {
        self.background
    }
    #[must_use]
    pub fn source(&self) -> &Arc<File> {
        &self.source
    }
    /// Resize for layout fitting. Non-finite or non-positive dimensions are
    /// ignored; a zero-area artboard would make every draw degenerate.
    pub fn resize(&mut self, width: f32, height: f32) {
        if width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0 {
            self.width = width;
            self.height = height;
        }
    }
}

//! Typed property values for view-model instances.
//!
//! The value kinds form a closed set: the server matches on them exhaustively,
//! so adding a kind is a compile-time exercise rather than a runtime type scan.

use crate::id::Handle;
use crate::vm::ViewModelInstance;

/// Namespace for decoded platform assets (images, audio clips, font faces).
/// The decoded payloads live in the runtime crate; the scene model only ever
/// references them by handle.
pub enum AssetTag {}

/// Packed `0xAARRGGBB` color, the document interchange format.
#[repr(transparent)]
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
    bytemuck::Pod,
    bytemuck::Zeroable,
)]
pub struct Color(pub u32);
impl Color {
    pub const TRANSPARENT: Self = Self(0x0000_0000);
    pub const BLACK: Self = Self(0xFF00_0000);
    pub const WHITE: Self = Self(0xFFFF_FFFF);

    #[must_use]
    pub const fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32))
    }
    #[must_use]
    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }
    #[must_use]
    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }
    #[must_use]
    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }
    #[must_use]
    pub const fn blue(self) -> u8 {
        self.0 as u8
    }
    /// Byte order used by render targets and readback buffers.
    #[must_use]
    pub const fn to_rgba8(self) -> [u8; 4] {
        [self.red(), self.green(), self.blue(), self.alpha()]
    }
}
impl std::fmt::Debug for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Color(#{:08X})", self.0)
    }
}

/// A value stored in (or written to) a view-model property.
///
/// `Trigger` is a stateless pulse: "setting" it fires the trigger rather than
/// persisting anything. `Instance` and `List` reference other view-model
/// instances by handle, never by pointer, so a deleted referent degrades into
/// a failed table lookup instead of a dangling reference.
#[derive(Clone, Debug, PartialEq, strum::EnumDiscriminants)]
#[strum_discriminants(name(PropertyType))]
#[strum_discriminants(derive(Hash, strum::Display))]
pub enum PropertyValue {
    Number(f32),
    String(String),
    Boolean(bool),
    /// The chosen option of a document-declared enum, by name.
    Enum(String),
    Color(Color),
    Trigger,
    /// Nested view-model instance. `None` until the slot is populated.
    Instance(Option<Handle<ViewModelInstance>>),
    /// Ordered, index-addressable collection of instances.
    List(Vec<Handle<ViewModelInstance>>),
    /// Reference to a decoded asset. `None` until resolved.
    Asset(Option<Handle<AssetTag>>),
}
impl PropertyValue {
    #[must_use]
    pub fn ty(&self) -> PropertyType {
        self.into()
    }
}

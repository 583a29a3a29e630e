//! # Scene model
//!
//! Documents and the things instantiated from them. A [`File`] is the imported,
//! immutable definition side; [`Artboard`], [`StateMachine`] and
//! [`LinearAnimation`] are the mutable instances the command server owns in its
//! tables. The split mirrors the usual definition/instance discipline: many
//! instances may derive from one file, and instances outlive the file's table
//! entry because each keeps the definitions alive through an `Arc`.
//!
//! Drawing here is deliberately reduced to "an artboard is a solid-color
//! rectangle": rasterization, path geometry and curve evaluation belong to the
//! rendering library this runtime orchestrates, not to the runtime itself.

mod animation;
mod artboard;
mod machine;

pub use animation::{Direction, LinearAnimation, LoopMode};
pub use artboard::Artboard;
pub use machine::{Advancement, Input, StateMachine};

use crate::value::Color;

/// Leading bytes of every document buffer.
pub const FILE_MAGIC: [u8; 4] = *b"STGH";

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("document buffer is empty")]
    Empty,
    #[error("not a stagehand document (bad magic)")]
    BadMagic,
    #[error("document descriptor is malformed: {0}")]
    Malformed(#[from] bincode::Error),
}

/// Everything a document declares, in interchange form.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DocumentDescriptor {
    pub artboards: Vec<ArtboardDescriptor>,
    pub view_models: Vec<ViewModelDescriptor>,
    /// Names of global assets this document wants substituted at import time.
    /// Unresolved names are tolerated; the document renders without them.
    pub referenced_assets: Vec<String>,
}
impl DocumentDescriptor {
    /// Encode into the buffer format [`File::import`] accepts.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        let mut bytes = FILE_MAGIC.to_vec();
        bytes.extend(bincode::serialize(self)?);
        Ok(bytes)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ArtboardDescriptor {
    pub name: String,
    pub width: f32,
    pub height: f32,
    pub background: Color,
    pub machines: Vec<StateMachineDescriptor>,
    pub animations: Vec<AnimationDescriptor>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StateMachineDescriptor {
    pub name: String,
    pub inputs: Vec<InputDescriptor>,
    pub layers: Vec<LayerDescriptor>,
    /// Data-binding outputs written to the bound view-model instance on every
    /// active advance.
    pub bindings: Vec<BindingDescriptor>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum InputDescriptor {
    Number { name: String, default: f32 },
    Boolean { name: String, default: bool },
    Trigger { name: String },
}

/// One timed layer of a state machine. A machine needs advancing while any of
/// its layers has time remaining.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LayerDescriptor {
    pub name: String,
    pub duration: f32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BindingDescriptor {
    /// Property path on the bound view-model instance.
    pub path: String,
    pub source: BindingSource,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum BindingSource {
    /// Seconds the machine has been advancing.
    ElapsedSeconds,
    /// The current value of the named number input.
    NumberInput(String),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AnimationDescriptor {
    pub name: String,
    pub duration: f32,
    pub loop_mode: LoopMode,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ViewModelDescriptor {
    pub name: String,
    pub properties: Vec<PropertyDescriptor>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub default: DefaultValue,
}

/// Interchange form of a property's initial value. Handles don't exist yet at
/// import time, so nested instances and assets are referenced by name and
/// resolved by the server when an instance is created.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum DefaultValue {
    Number(f32),
    String(String),
    Boolean(bool),
    Enum(String),
    Color(Color),
    Trigger,
    /// Nested instance of the named view model.
    Instance(String),
    /// Empty list whose elements will be instances of the named view model.
    List(String),
    /// Reference to the global asset with this name.
    Asset(String),
}

/// An imported document. Immutable once imported; shared by `Arc` with every
/// artboard instantiated from it so deleting the file's table entry never
/// invalidates live artboards.
pub struct File {
    descriptor: DocumentDescriptor,
}
impl File {
    /// Parse a document buffer. Tolerates nothing: empty, mis-tagged or
    /// truncated buffers all fail without side effects.
    pub fn import(bytes: &[u8]) -> Result<Self, ImportError> {
        if bytes.is_empty() {
            return Err(ImportError::Empty);
        }
        let Some(payload) = bytes.strip_prefix(&FILE_MAGIC[..]) else {
            return Err(ImportError::BadMagic);
        };
        let descriptor: DocumentDescriptor = bincode::deserialize(payload)?;
        Ok(Self { descriptor })
    }
    #[must_use]
    pub fn artboard_count(&self) -> usize {
        self.descriptor.artboards.len()
    }
    #[must_use]
    pub fn default_artboard(&self) -> Option<&ArtboardDescriptor> {
        self.descriptor.artboards.first()
    }
    #[must_use]
    pub fn artboard_named(&self, name: &str) -> Option<&ArtboardDescriptor> {
        self.descriptor.artboards.iter().find(|a| a.name == name)
    }
    #[must_use]
    pub fn default_view_model(&self) -> Option<&ViewModelDescriptor> {
        self.descriptor.view_models.first()
    }
    #[must_use]
    pub fn view_model_named(&self, name: &str) -> Option<&ViewModelDescriptor> {
        self.descriptor.view_models.iter().find(|v| v.name == name)
    }
    #[must_use]
    pub fn referenced_assets(&self) -> &[String] {
        &self.descriptor.referenced_assets
    }
}

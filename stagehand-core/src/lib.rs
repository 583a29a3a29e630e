//! # stagehand-core
//!
//! The scene model driven by the `stagehand` command server: documents and the
//! artboards, state machines, animations and view-model instances instantiated
//! from them, plus the typed handles that identify every one of those resources.
//!
//! Nothing in this crate is thread-safe by construction; all instances are
//! owned and mutated by the server's single worker thread. The types here only
//! need to be `Send` so they can be moved onto that thread once.

pub mod id;
pub mod path;
pub mod scene;
pub mod value;
pub mod vm;

pub use id::{Handle, HandleAllocator};

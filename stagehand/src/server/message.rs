//! Messages: everything the worker sends back to callers.
//!
//! Replies echo the request id of the command that produced them; unsolicited
//! notifications (settles, animation endings, property updates) carry id `0`.
//! Failures travel the same queue as successes so callers observe one ordered
//! stream per server.

use stagehand_core::value::{PropertyType, PropertyValue};

use super::{
    AnimationHandle, ArtboardHandle, AssetHandle, FileHandle, InstanceHandle, MachineHandle,
    RequestId, TargetHandle,
};

/// Which resource table a handle was expected to live in. Used in errors and
/// shutdown accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ResourceKind {
    File,
    Artboard,
    StateMachine,
    Animation,
    ViewModelInstance,
    RenderTarget,
    Asset,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    #[error("{kind} handle {handle} is not alive")]
    InvalidHandle { kind: ResourceKind, handle: u64 },
    #[error("{kind} named {name:?} does not exist")]
    NotFound { kind: ResourceKind, name: String },
    #[error("property at {path:?} is {found}, expected {expected}")]
    TypeMismatch {
        path: String,
        expected: PropertyType,
        found: PropertyType,
    },
    #[error("file import failed: {0}")]
    Import(String),
    #[error("creation failed: {0}")]
    Creation(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("bad property path {path:?}: {reason}")]
    Path { path: String, reason: String },
    #[error("draw rejected: {0}")]
    Draw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Request id of the command this replies to; `0` for unsolicited
    /// notifications.
    pub request_id: RequestId,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, strum::EnumDiscriminants)]
#[strum_discriminants(name(EventKind), derive(Hash, strum::Display))]
pub enum Event {
    // Replies
    FileLoaded(FileHandle),
    FileDeleted(FileHandle),
    ArtboardCreated(ArtboardHandle),
    ArtboardDeleted(ArtboardHandle),
    ArtboardResized(ArtboardHandle),
    MachineCreated(MachineHandle),
    MachineDeleted(MachineHandle),
    ViewModelBound {
        machine: MachineHandle,
        instance: InstanceHandle,
    },
    AnimationCreated(AnimationHandle),
    AnimationDeleted(AnimationHandle),
    InstanceCreated(InstanceHandle),
    InstanceDeleted(InstanceHandle),
    PropertySet {
        instance: InstanceHandle,
        path: String,
    },
    PropertyValue {
        instance: InstanceHandle,
        path: String,
        value: PropertyValue,
    },
    ListLength {
        instance: InstanceHandle,
        path: String,
        length: usize,
    },
    /// A list mutation went through; `length` is the list's new length.
    ListUpdated {
        instance: InstanceHandle,
        path: String,
        length: usize,
    },
    Subscribed {
        instance: InstanceHandle,
        path: String,
    },
    Unsubscribed {
        instance: InstanceHandle,
        path: String,
    },
    TargetCreated(TargetHandle),
    TargetDeleted(TargetHandle),
    /// Readback pixels, ownership transferred to the caller.
    PixelsReady {
        target: TargetHandle,
        width: u32,
        height: u32,
        pixels: Box<[u8]>,
    },
    AssetDecoded(AssetHandle),
    AssetDeleted(AssetHandle),

    // Unsolicited notifications (request id 0)
    /// The machine settled on this advance. Sent once per quiet period.
    Settled(MachineHandle),
    /// A one-shot animation reached its end on this advance.
    AnimationFinished(AnimationHandle),
    /// A subscribed property changed, whether by a caller command or by an
    /// internal data-binding write.
    PropertyUpdated {
        instance: InstanceHandle,
        path: String,
        value: PropertyValue,
    },

    /// The command identified by the echoed request id failed.
    Error(ServerError),
}

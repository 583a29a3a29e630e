//! Command records: the requests caller threads enqueue for the worker.
//!
//! Every command carries a caller-supplied request id used to correlate the
//! reply; `0` marks fire-and-forget kinds that owe no reply. Payloads carry
//! handles and owned data only, never borrowed pointers, so a resource
//! deleted between enqueue and execution degrades into a failed table lookup.

use stagehand_core::scene::Direction;
use stagehand_core::value::{Color, PropertyType, PropertyValue};

use super::worker::Exec;
use super::{
    AnimationHandle, ArtboardHandle, AssetHandle, FileHandle, InstanceHandle, MachineHandle,
    RequestId, TargetHandle,
};
use crate::render::{Alignment, Fit};

/// Deferred work executed on the worker thread by [`Op::RunOnce`].
pub type RunOnceFn = Box<dyn FnOnce(&mut Exec<'_>) + Send>;

pub struct Command {
    /// Correlation token echoed in the reply. `0` = fire-and-forget.
    pub request_id: RequestId,
    pub op: Op,
}
impl Default for Command {
    fn default() -> Self {
        Self {
            request_id: 0,
            op: Op::Nop,
        }
    }
}

/// Which driver advances/draws an artboard this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Machine(MachineHandle),
    Animation(AnimationHandle),
}

/// One artboard drawn into a render target.
#[derive(Debug, Clone)]
pub struct DrawRequest {
    pub target: TargetHandle,
    pub artboard: ArtboardHandle,
    pub driver: Option<Driver>,
    pub fit: Fit,
    pub alignment: Alignment,
    /// Clear the target to this color before drawing.
    pub clear: Option<Color>,
}

/// One entry of a batch draw: an artboard/driver pair with its own affine
/// placement and destination cell size within the shared target.
#[derive(Debug, Clone)]
pub struct Sprite {
    pub artboard: ArtboardHandle,
    pub driver: Option<Driver>,
    /// Column-major 2x3 affine `[a, b, c, d, tx, ty]` applied after fitting
    /// the artboard into `size`.
    pub transform: [f32; 6],
    /// Destination cell size, in target pixels.
    pub size: (f32, f32),
}

#[derive(strum::EnumDiscriminants)]
#[strum_discriminants(name(OpKind), derive(strum::Display))]
pub enum Op {
    /// Unrecognized/default-initialized command. Explicitly a no-op.
    Nop,

    // Files
    LoadFile { bytes: Box<[u8]> },
    DeleteFile { file: FileHandle },

    // Artboards
    CreateDefaultArtboard { file: FileHandle },
    CreateArtboardByName { file: FileHandle, name: String },
    DeleteArtboard { artboard: ArtboardHandle },
    ResizeArtboard { artboard: ArtboardHandle, width: f32, height: f32 },

    // State machines
    CreateDefaultStateMachine { artboard: ArtboardHandle },
    CreateStateMachineByName { artboard: ArtboardHandle, name: String },
    DeleteStateMachine { machine: MachineHandle },
    /// Fire-and-forget. Delta is seconds; callers with nanosecond clocks
    /// convert before enqueueing.
    AdvanceStateMachine { machine: MachineHandle, delta_seconds: f32 },
    PointerMove { machine: MachineHandle, x: f32, y: f32 },
    PointerDown { machine: MachineHandle, x: f32, y: f32 },
    PointerUp { machine: MachineHandle, x: f32, y: f32 },
    /// Legacy named inputs. Unknown names and mismatched types are silently
    /// ignored - a compatibility contract, not an oversight.
    SetNumberInput { machine: MachineHandle, name: String, value: f32 },
    SetBooleanInput { machine: MachineHandle, name: String, value: bool },
    FireTriggerInput { machine: MachineHandle, name: String },
    BindViewModel { machine: MachineHandle, instance: InstanceHandle },

    // Linear animations
    CreateAnimation { artboard: ArtboardHandle, name: Option<String> },
    DeleteAnimation { animation: AnimationHandle },
    AdvanceAnimation { animation: AnimationHandle, delta_seconds: f32 },
    SetAnimationDirection { animation: AnimationHandle, direction: Direction },

    // View-model instances
    CreateViewModelInstance { file: FileHandle, view_model: Option<String> },
    DeleteViewModelInstance { instance: InstanceHandle },

    // Properties, addressed by dot/bracket path from a root instance.
    /// Setting a `Trigger` value fires the trigger (stateless pulse).
    SetProperty { instance: InstanceHandle, path: String, value: PropertyValue },
    GetProperty { instance: InstanceHandle, path: String, ty: PropertyType },
    AppendListItem { instance: InstanceHandle, path: String, item: InstanceHandle },
    InsertListItem { instance: InstanceHandle, path: String, index: usize, item: InstanceHandle },
    RemoveListItem { instance: InstanceHandle, path: String, index: usize },
    SwapListItems { instance: InstanceHandle, path: String, a: usize, b: usize },
    GetListLength { instance: InstanceHandle, path: String },

    // Subscriptions
    Subscribe { instance: InstanceHandle, path: String, ty: PropertyType },
    Unsubscribe { instance: InstanceHandle, path: String, ty: PropertyType },

    // Rendering
    CreateRenderTarget { width: u32, height: u32, samples: u32 },
    DeleteRenderTarget { target: TargetHandle },
    /// Fire-and-forget per-frame draw; missing handles log once and skip.
    Draw(DrawRequest),
    /// Draw then read pixels back, delivered by `Event::PixelsReady`.
    DrawToBuffer { request: DrawRequest, flip: bool },
    /// Draw N sprites into one shared target in one flush.
    DrawBatch {
        target: TargetHandle,
        clear: Option<Color>,
        sprites: Vec<Sprite>,
        flip: bool,
        readback: bool,
    },

    // Decoded assets
    DecodeImage { bytes: Box<[u8]>, name: Option<String> },
    DecodeAudio { bytes: Box<[u8]>, name: Option<String> },
    DecodeFont { bytes: Box<[u8]>, name: Option<String> },
    DeleteAsset { asset: AssetHandle },

    /// Synchronous escape hatch; see [`super::CommandServer::run_once`].
    RunOnce(RunOnceFn),
    /// Internal: stop the worker loop. Enqueued by the lifecycle controller.
    Shutdown,
}

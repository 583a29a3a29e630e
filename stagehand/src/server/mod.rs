//! # The command server
//!
//! One worker thread owns every file, artboard, state machine, animation,
//! view-model instance, render target and decoded asset. Callers on any
//! thread enqueue [`Command`]s and drain [`Message`]s; the worker executes
//! commands strictly in arrival order, so replies for one caller's commands
//! come back in the order they were submitted.
//!
//! Resources are named by typed handles: plain integers under the hood,
//! allocated once and never reused, so a handle outliving its resource is a
//! reportable error instead of undefined behavior.
//!
//! The one synchronous escape hatch is [`CommandServer::run_once`], which
//! parks the calling thread until the worker executes the closure between
//! queued commands. It exists for embedders that must create or read
//! thread-affine render resources mid-frame.

mod command;
mod message;
mod subscriptions;
mod tables;
mod worker;

pub use command::{Command, Driver, DrawRequest, Op, RunOnceFn, Sprite};
pub use message::{Event, EventKind, Message, ResourceKind, ServerError};
pub use worker::Exec;

use stagehand_core::id::Handle;
use stagehand_core::scene::{Artboard, File, LinearAnimation, StateMachine};
use stagehand_core::value::AssetTag;
use stagehand_core::vm::ViewModelInstance;

use crate::decode::PlatformDecoders;
use crate::render::{ContextError, ContextOptions, RenderContext, RenderTarget};
use worker::Worker;

/// Caller-chosen correlation token echoed in replies. `0` is reserved for
/// fire-and-forget commands and unsolicited notifications.
pub type RequestId = u64;

pub type FileHandle = Handle<File>;
pub type ArtboardHandle = Handle<Artboard>;
pub type MachineHandle = Handle<StateMachine>;
pub type AnimationHandle = Handle<LinearAnimation>;
pub type InstanceHandle = Handle<ViewModelInstance>;
pub type TargetHandle = Handle<RenderTarget>;
pub type AssetHandle = Handle<AssetTag>;

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("render context creation failed: {0}")]
    Context(#[from] ContextError),
    #[error("failed to spawn the worker thread: {0}")]
    Spawn(std::io::Error),
    #[error("worker thread exited during startup")]
    WorkerLost,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOnceError {
    /// Called from the worker thread itself, which would deadlock.
    #[error("run_once called from the worker thread")]
    Reentrant,
    #[error("the worker is no longer running")]
    Disconnected,
}

pub struct ServerOptions {
    pub context: ContextOptions,
    pub decoders: PlatformDecoders,
}
impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            context: ContextOptions::default(),
            decoders: PlatformDecoders::default(),
        }
    }
}

/// Caller-side front of the server. Cheap to share behind an `Arc`; dropping
/// it shuts the worker down and joins the thread.
pub struct CommandServer {
    commands: crossbeam::channel::Sender<Command>,
    messages: crossbeam::channel::Receiver<Message>,
    worker_thread: std::thread::ThreadId,
    join: Option<std::thread::JoinHandle<()>>,
}

impl CommandServer {
    pub fn new() -> Result<Self, StartupError> {
        Self::with_options(ServerOptions::default())
    }

    /// Spawn the worker and complete the startup handshake: the worker builds
    /// its render context first and reports the outcome before any command is
    /// accepted, so a context failure surfaces here, synchronously.
    pub fn with_options(options: ServerOptions) -> Result<Self, StartupError> {
        let ServerOptions { context, decoders } = options;
        let (command_send, command_recv) = crossbeam::channel::unbounded();
        let (message_send, message_recv) = crossbeam::channel::unbounded();
        let (ready_send, ready_recv) = crossbeam::channel::bounded(1);

        let join = std::thread::Builder::new()
            .name("stagehand-worker".to_owned())
            .spawn(move || {
                // Context creation pins thread affinity; it must be the
                // thread's first act and the context must die here too.
                let context = match RenderContext::new(&context) {
                    Ok(context) => context,
                    Err(error) => {
                        let _ = ready_send.send(Err(error));
                        return;
                    }
                };
                if ready_send.send(Ok(std::thread::current().id())).is_err() {
                    return;
                }
                Worker::new(context, decoders, message_send).run(&command_recv);
            })
            .map_err(StartupError::Spawn)?;

        let worker_thread = match ready_recv.recv() {
            Ok(Ok(id)) => id,
            Ok(Err(error)) => {
                let _ = join.join();
                return Err(error.into());
            }
            Err(_) => {
                let _ = join.join();
                return Err(StartupError::WorkerLost);
            }
        };
        Ok(Self {
            commands: command_send,
            messages: message_recv,
            worker_thread,
            join: Some(join),
        })
    }

    pub fn enqueue(&self, command: Command) {
        // A dead worker means shutdown is already underway; the caller finds
        // out through the drained (and then disconnected) message queue.
        if self.commands.send(command).is_err() {
            log::debug!("command dropped: worker is gone");
        }
    }
    /// Convenience wrapper for [`Self::enqueue`].
    pub fn submit(&self, request_id: RequestId, op: Op) {
        self.enqueue(Command { request_id, op });
    }

    /// Collect every message currently queued, without blocking.
    #[must_use]
    pub fn drain(&self) -> Vec<Message> {
        let mut drained = Vec::new();
        while let Ok(message) = self.messages.try_recv() {
            drained.push(message);
        }
        drained
    }

    /// Run `callback` on the worker thread, after every command enqueued
    /// before this call, and block until it returns.
    ///
    /// Calling this from inside a `run_once` closure (or anywhere else on the
    /// worker thread) fails with [`RunOnceError::Reentrant`] instead of
    /// deadlocking.
    pub fn run_once<R, F>(&self, callback: F) -> Result<R, RunOnceError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Exec<'_>) -> R + Send + 'static,
    {
        if std::thread::current().id() == self.worker_thread {
            return Err(RunOnceError::Reentrant);
        }
        let (result_send, result_recv) = crossbeam::channel::bounded(1);
        let wrapped: RunOnceFn = Box::new(move |exec| {
            let _ = result_send.send(callback(exec));
        });
        self.commands
            .send(Command {
                request_id: 0,
                op: Op::RunOnce(wrapped),
            })
            .map_err(|_| RunOnceError::Disconnected)?;
        result_recv.recv().map_err(|_| RunOnceError::Disconnected)
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        let _ = self.commands.send(Command {
            request_id: 0,
            op: Op::Shutdown,
        });
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("worker thread panicked during shutdown");
            }
        }
    }
}

//! # stagehand
//!
//! A command-server runtime for scene-graph documents. One dedicated worker
//! thread owns every resource table and the thread-affine render context;
//! arbitrary caller threads reach it exclusively through an asynchronous
//! command/message protocol plus a blocking [`server::CommandServer::run_once`]
//! escape hatch. No lock ever guards business state; confinement to one
//! thread is the whole synchronization strategy.

pub mod decode;
pub mod render;
pub mod server;

pub use server::{
    Command, CommandServer, Driver, DrawRequest, Event, Message, Op, RequestId, ResourceKind,
    RunOnceError, ServerError, ServerOptions, Sprite, StartupError,
};

//! The worker: single owner of every resource table and the render context.
//!
//! Runs the blocking receive loop on its own thread. Nothing in here is
//! reachable from any other thread; callers interact exclusively through the
//! command and message channels in [`super`]. That single-owner discipline is
//! the whole concurrency story, so none of these types are `Sync`.

use std::sync::Arc;

use cgmath::Matrix3;
use stagehand_core::id::HandleAllocator;
use stagehand_core::path::{PropertyPath, Segment};
use stagehand_core::scene::{Artboard, File, LinearAnimation, StateMachine};
use stagehand_core::value::{AssetTag, PropertyValue};
use stagehand_core::vm::{PendingDefault, ViewModelInstance, VmError};

use super::command::{Command, Driver, DrawRequest, Op, OpKind};
use super::message::{Event, EventKind, Message, ResourceKind, ServerError};
use super::subscriptions::SubscriptionRegistry;
use super::tables::Table;
use super::{
    ArtboardHandle, AssetHandle, FileHandle, InstanceHandle, MachineHandle, RequestId,
    TargetHandle,
};
use crate::decode::{DecodedAsset, PlatformDecoders};
use crate::render::{self, fit, Alignment, Fit, RenderContext, RenderTarget};

/// Nested-instance defaults deeper than this indicate a definition cycle.
const MAX_INSTANCE_DEPTH: usize = 32;

pub(crate) struct FileEntry {
    pub file: Arc<File>,
}

pub(crate) struct MachineEntry {
    pub machine: StateMachine,
    /// The artboard this machine was instantiated for.
    pub artboard: ArtboardHandle,
}

pub(crate) struct AnimationEntry {
    pub animation: LinearAnimation,
    pub artboard: ArtboardHandle,
}

pub(crate) struct Worker {
    allocator: HandleAllocator,
    context: RenderContext,
    decoders: PlatformDecoders,
    messages: crossbeam::channel::Sender<Message>,

    files: Table<File, FileEntry>,
    artboards: Table<Artboard, Artboard>,
    machines: Table<StateMachine, MachineEntry>,
    animations: Table<LinearAnimation, AnimationEntry>,
    instances: Table<ViewModelInstance, ViewModelInstance>,
    targets: Table<RenderTarget, RenderTarget>,
    assets: Table<AssetTag, DecodedAsset>,
    /// Global name → asset index, for import-time substitution and pending
    /// asset defaults.
    asset_names: hashbrown::HashMap<String, AssetHandle>,
    subscriptions: SubscriptionRegistry,
    /// (target, artboard) pairs whose per-frame draw already logged a failure.
    /// Handles are never reused, so entries never need resetting.
    draw_skips: hashbrown::HashSet<(u64, u64)>,
}

impl Worker {
    pub fn new(
        context: RenderContext,
        decoders: PlatformDecoders,
        messages: crossbeam::channel::Sender<Message>,
    ) -> Self {
        Self {
            allocator: HandleAllocator::new(),
            context,
            decoders,
            messages,
            files: Table::new(ResourceKind::File),
            artboards: Table::new(ResourceKind::Artboard),
            machines: Table::new(ResourceKind::StateMachine),
            animations: Table::new(ResourceKind::Animation),
            instances: Table::new(ResourceKind::ViewModelInstance),
            targets: Table::new(ResourceKind::RenderTarget),
            assets: Table::new(ResourceKind::Asset),
            asset_names: hashbrown::HashMap::new(),
            subscriptions: SubscriptionRegistry::new(),
            draw_skips: hashbrown::HashSet::new(),
        }
    }

    /// The worker loop: block on the command queue, execute, repeat until
    /// shutdown or every sender is gone.
    pub fn run(mut self, commands: &crossbeam::channel::Receiver<Command>) {
        while let Ok(command) = commands.recv() {
            if matches!(command.op, Op::Shutdown) {
                break;
            }
            self.dispatch(command.request_id, command.op);
        }
        self.teardown();
    }

    fn dispatch(&mut self, request_id: RequestId, op: Op) {
        let kind = OpKind::from(&op);
        match self.execute(op) {
            Ok(Some(event)) => {
                log::trace!(
                    "{kind} (request {request_id}) replied {}",
                    EventKind::from(&event)
                );
                self.post(request_id, event);
            }
            Ok(None) => {}
            Err(error) => {
                log::debug!("{kind} (request {request_id}) failed: {error}");
                self.post(request_id, Event::Error(error));
            }
        }
    }

    /// Enqueue a message for the caller side. A gone receiver only happens
    /// during teardown races and is not an error here.
    fn post(&self, request_id: RequestId, event: Event) {
        let _ = self.messages.send(Message { request_id, event });
    }

    fn execute(&mut self, op: Op) -> Result<Option<Event>, ServerError> {
        match op {
            Op::Nop | Op::Shutdown => Ok(None),

            Op::LoadFile { bytes } => self.load_file(&bytes).map(Some),
            Op::DeleteFile { file } => {
                self.files.remove(file)?;
                Ok(Some(Event::FileDeleted(file)))
            }

            Op::CreateDefaultArtboard { file } => {
                self.create_artboard(file, None).map(Some)
            }
            Op::CreateArtboardByName { file, name } => {
                self.create_artboard(file, Some(&name)).map(Some)
            }
            Op::DeleteArtboard { artboard } => {
                self.artboards.remove(artboard)?;
                Ok(Some(Event::ArtboardDeleted(artboard)))
            }
            Op::ResizeArtboard { artboard, width, height } => {
                self.artboards.get_mut(artboard)?.resize(width, height);
                Ok(Some(Event::ArtboardResized(artboard)))
            }

            Op::CreateDefaultStateMachine { artboard } => {
                self.create_machine(artboard, None).map(Some)
            }
            Op::CreateStateMachineByName { artboard, name } => {
                self.create_machine(artboard, Some(&name)).map(Some)
            }
            Op::DeleteStateMachine { machine } => {
                self.machines.remove(machine)?;
                Ok(Some(Event::MachineDeleted(machine)))
            }
            Op::AdvanceStateMachine { machine, delta_seconds } => {
                self.advance_machine(machine, delta_seconds)?;
                Ok(None)
            }
            Op::PointerMove { machine, x, y } => {
                self.machines.get_mut(machine)?.machine.pointer_move(x, y);
                Ok(None)
            }
            Op::PointerDown { machine, x, y } => {
                self.machines.get_mut(machine)?.machine.pointer_down(x, y);
                Ok(None)
            }
            Op::PointerUp { machine, x, y } => {
                self.machines.get_mut(machine)?.machine.pointer_up(x, y);
                Ok(None)
            }
            Op::SetNumberInput { machine, name, value } => {
                // Misses (unknown name or wrong type) are silently ignored.
                if !self.machines.get_mut(machine)?.machine.set_number(&name, value) {
                    log::trace!("number input {name:?} missed on {machine}");
                }
                Ok(None)
            }
            Op::SetBooleanInput { machine, name, value } => {
                if !self.machines.get_mut(machine)?.machine.set_boolean(&name, value) {
                    log::trace!("boolean input {name:?} missed on {machine}");
                }
                Ok(None)
            }
            Op::FireTriggerInput { machine, name } => {
                if !self.machines.get_mut(machine)?.machine.fire_trigger(&name) {
                    log::trace!("trigger input {name:?} missed on {machine}");
                }
                Ok(None)
            }
            Op::BindViewModel { machine, instance } => {
                // Validate the instance before mutating the machine.
                self.instances.get(instance)?;
                self.machines.get_mut(machine)?.machine.bind(instance);
                Ok(Some(Event::ViewModelBound { machine, instance }))
            }

            Op::CreateAnimation { artboard, name } => {
                self.create_animation(artboard, name.as_deref()).map(Some)
            }
            Op::DeleteAnimation { animation } => {
                self.animations.remove(animation)?;
                Ok(Some(Event::AnimationDeleted(animation)))
            }
            Op::AdvanceAnimation { animation, delta_seconds } => {
                let entry = self.animations.get_mut(animation)?;
                let was_playing = entry.animation.is_playing();
                let playing = entry.animation.advance(delta_seconds);
                if was_playing && !playing {
                    self.post(0, Event::AnimationFinished(animation));
                }
                Ok(None)
            }
            Op::SetAnimationDirection { animation, direction } => {
                self.animations
                    .get_mut(animation)?
                    .animation
                    .set_direction(direction);
                Ok(None)
            }

            Op::CreateViewModelInstance { file, view_model } => {
                let source = self.files.get(file)?.file.clone();
                let handle =
                    self.instantiate_view_model(&source, view_model.as_deref(), 0)?;
                Ok(Some(Event::InstanceCreated(handle)))
            }
            Op::DeleteViewModelInstance { instance } => {
                self.instances.remove(instance)?;
                self.subscriptions.remove_instance(instance);
                Ok(Some(Event::InstanceDeleted(instance)))
            }

            Op::SetProperty { instance, path, value } => {
                let (owner, leaf) = self.resolve_owner(instance, &path)?;
                let stored = value.clone();
                self.instances
                    .get_mut(owner)?
                    .set(&leaf, value)
                    .map_err(|e| map_vm(&path, e))?;
                self.notify(instance, &path, stored);
                Ok(Some(Event::PropertySet { instance, path }))
            }
            Op::GetProperty { instance, path, ty } => {
                let (owner, leaf) = self.resolve_owner(instance, &path)?;
                let value = self
                    .instances
                    .get(owner)?
                    .get(&leaf)
                    .ok_or_else(|| map_vm(&path, VmError::NoSuchProperty(leaf.clone())))?
                    .clone();
                if value.ty() != ty {
                    return Err(ServerError::TypeMismatch {
                        path,
                        expected: ty,
                        found: value.ty(),
                    });
                }
                Ok(Some(Event::PropertyValue { instance, path, value }))
            }

            Op::AppendListItem { instance, path, item } => {
                self.instances.get(item)?;
                self.mutate_list(instance, path, |vm, leaf| vm.list_append(leaf, item))
                    .map(Some)
            }
            Op::InsertListItem { instance, path, index, item } => {
                self.instances.get(item)?;
                self.mutate_list(instance, path, |vm, leaf| {
                    vm.list_insert(leaf, index, item)
                })
                .map(Some)
            }
            Op::RemoveListItem { instance, path, index } => {
                self.mutate_list(instance, path, |vm, leaf| {
                    vm.list_remove(leaf, index)?;
                    vm.list_len(leaf)
                })
                .map(Some)
            }
            Op::SwapListItems { instance, path, a, b } => {
                self.mutate_list(instance, path, |vm, leaf| {
                    vm.list_swap(leaf, a, b)?;
                    vm.list_len(leaf)
                })
                .map(Some)
            }
            Op::GetListLength { instance, path } => {
                let (owner, leaf) = self.resolve_owner(instance, &path)?;
                let length = self
                    .instances
                    .get(owner)?
                    .list_len(&leaf)
                    .map_err(|e| map_vm(&path, e))?;
                Ok(Some(Event::ListLength { instance, path, length }))
            }

            Op::Subscribe { instance, path, ty } => {
                self.instances.get(instance)?;
                // Re-subscribing an existing triple is a no-op, not an error.
                self.subscriptions.subscribe(instance, &path, ty);
                Ok(Some(Event::Subscribed { instance, path }))
            }
            Op::Unsubscribe { instance, path, ty } => {
                self.subscriptions.unsubscribe(instance, &path, ty);
                Ok(Some(Event::Unsubscribed { instance, path }))
            }

            Op::CreateRenderTarget { width, height, samples } => {
                let target = self
                    .context
                    .create_target(width, height, samples)
                    .map_err(|e| ServerError::Creation(e.to_string()))?;
                let handle = self.targets.insert(&mut self.allocator, target);
                Ok(Some(Event::TargetCreated(handle)))
            }
            Op::DeleteRenderTarget { target } => {
                self.targets.remove(target)?;
                Ok(Some(Event::TargetDeleted(target)))
            }
            Op::Draw(request) => {
                // Per-frame path: a dead handle must not spam an error per
                // frame, so failures log once per (target, artboard) pair.
                if let Err(error) = self.execute_draw(&request, true) {
                    let key = (request.target.raw(), request.artboard.raw());
                    if self.draw_skips.insert(key) {
                        log::warn!(
                            "skipping draws of {} into {}: {error}",
                            request.artboard,
                            request.target
                        );
                    }
                }
                Ok(None)
            }
            Op::DrawToBuffer { request, flip } => {
                self.execute_draw(&request, true)?;
                let target = self.targets.get(request.target)?;
                Ok(Some(Event::PixelsReady {
                    target: request.target,
                    width: target.width(),
                    height: target.height(),
                    pixels: target.to_bytes(flip),
                }))
            }
            Op::DrawBatch { target, clear, sprites, flip, readback } => {
                self.execute_batch(target, clear, &sprites, flip)?;
                if !readback {
                    return Ok(None);
                }
                let surface = self.targets.get(target)?;
                Ok(Some(Event::PixelsReady {
                    target,
                    width: surface.width(),
                    height: surface.height(),
                    pixels: surface.to_bytes(false),
                }))
            }

            Op::DecodeImage { bytes, name } => {
                let image = self
                    .decoders
                    .decode_image(&bytes)
                    .map_err(|e| ServerError::Decode(e.to_string()))?;
                Ok(Some(Event::AssetDecoded(self.register_asset(
                    DecodedAsset {
                        name,
                        payload: crate::decode::AssetPayload::Image(image),
                    },
                ))))
            }
            Op::DecodeAudio { bytes, name } => {
                let audio = self
                    .decoders
                    .decode_audio(&bytes)
                    .map_err(|e| ServerError::Decode(e.to_string()))?;
                Ok(Some(Event::AssetDecoded(self.register_asset(
                    DecodedAsset {
                        name,
                        payload: crate::decode::AssetPayload::Audio(audio),
                    },
                ))))
            }
            Op::DecodeFont { bytes, name } => {
                let font = self
                    .decoders
                    .decode_font(&bytes)
                    .map_err(|e| ServerError::Decode(e.to_string()))?;
                Ok(Some(Event::AssetDecoded(self.register_asset(
                    DecodedAsset {
                        name,
                        payload: crate::decode::AssetPayload::Font(font),
                    },
                ))))
            }
            Op::DeleteAsset { asset } => {
                let removed = self.assets.remove(asset)?;
                if let Some(name) = removed.name {
                    self.asset_names.remove(&name);
                }
                Ok(Some(Event::AssetDeleted(asset)))
            }

            Op::RunOnce(callback) => {
                callback(&mut Exec { worker: self });
                Ok(None)
            }
        }
    }

    fn load_file(&mut self, bytes: &[u8]) -> Result<Event, ServerError> {
        let file = File::import(bytes).map_err(|e| ServerError::Import(e.to_string()))?;
        if file.artboard_count() == 0 {
            // Legal to load; artboard creation from it will fail by name.
            log::debug!("loaded a document that declares no artboards");
        }
        for name in file.referenced_assets() {
            if !self.asset_names.contains_key(name) {
                // Tolerated: the document renders without the asset.
                log::debug!("referenced asset {name:?} is not registered");
            }
        }
        let handle = self
            .files
            .insert(&mut self.allocator, FileEntry { file: Arc::new(file) });
        Ok(Event::FileLoaded(handle))
    }

    fn create_artboard(
        &mut self,
        file: FileHandle,
        name: Option<&str>,
    ) -> Result<Event, ServerError> {
        let artboard = {
            let source = &self.files.get(file)?.file;
            let descriptor = match name {
                Some(name) => source.artboard_named(name),
                None => source.default_artboard(),
            }
            .ok_or_else(|| ServerError::NotFound {
                kind: ResourceKind::Artboard,
                name: name.unwrap_or("<default>").to_owned(),
            })?;
            Artboard::instantiate(source, descriptor)
        };
        let handle = self.artboards.insert(&mut self.allocator, artboard);
        Ok(Event::ArtboardCreated(handle))
    }

    fn create_machine(
        &mut self,
        artboard: ArtboardHandle,
        name: Option<&str>,
    ) -> Result<Event, ServerError> {
        let machine = {
            let board = self.artboards.get(artboard)?;
            // Machine definitions live on the artboard's descriptor in the
            // source file, which the artboard keeps alive.
            let descriptor = board
                .source()
                .artboard_named(board.name())
                .and_then(|a| match name {
                    Some(name) => a.machines.iter().find(|m| m.name == name),
                    None => a.machines.first(),
                })
                .ok_or_else(|| ServerError::NotFound {
                    kind: ResourceKind::StateMachine,
                    name: name.unwrap_or("<default>").to_owned(),
                })?;
            StateMachine::instantiate(descriptor)
        };
        let handle = self
            .machines
            .insert(&mut self.allocator, MachineEntry { machine, artboard });
        Ok(Event::MachineCreated(handle))
    }

    fn create_animation(
        &mut self,
        artboard: ArtboardHandle,
        name: Option<&str>,
    ) -> Result<Event, ServerError> {
        let animation = {
            let board = self.artboards.get(artboard)?;
            let descriptor = board
                .source()
                .artboard_named(board.name())
                .and_then(|a| match name {
                    Some(name) => a.animations.iter().find(|anim| anim.name == name),
                    None => a.animations.first(),
                })
                .ok_or_else(|| ServerError::NotFound {
                    kind: ResourceKind::Animation,
                    name: name.unwrap_or("<default>").to_owned(),
                })?;
            LinearAnimation::instantiate(descriptor)
        };
        let handle = self
            .animations
            .insert(&mut self.allocator, AnimationEntry { animation, artboard });
        Ok(Event::AnimationCreated(handle))
    }

    fn advance_machine(
        &mut self,
        machine: MachineHandle,
        delta_seconds: f32,
    ) -> Result<(), ServerError> {
        let (bound, advancement) = {
            let entry = self.machines.get_mut(machine)?;
            (entry.machine.bound(), entry.machine.advance(delta_seconds))
        };
        if let Some(root) = bound {
            for (path, value) in advancement.writes {
                // Binding writes flow through the same property machinery as
                // caller writes, subscriptions included. A stale bound
                // instance degrades into a logged skip.
                if let Err(error) = self.write_binding(root, &path, value) {
                    log::debug!("binding write to {root} at {path:?} skipped: {error}");
                }
            }
        }
        if advancement.settled_now {
            self.post(0, Event::Settled(machine));
        }
        Ok(())
    }

    fn write_binding(
        &mut self,
        root: InstanceHandle,
        path: &str,
        value: f32,
    ) -> Result<(), ServerError> {
        let (owner, leaf) = self.resolve_owner(root, path)?;
        self.instances
            .get_mut(owner)?
            .set(&leaf, PropertyValue::Number(value))
            .map_err(|e| map_vm(path, e))?;
        self.notify(root, path, PropertyValue::Number(value));
        Ok(())
    }

    /// Recursively build an instance of the named (or default) view model,
    /// resolving nested-instance and asset defaults against the tables.
    fn instantiate_view_model(
        &mut self,
        source: &Arc<File>,
        name: Option<&str>,
        depth: usize,
    ) -> Result<InstanceHandle, ServerError> {
        if depth >= MAX_INSTANCE_DEPTH {
            return Err(ServerError::Creation(
                "view-model defaults nest too deeply (definition cycle?)".to_owned(),
            ));
        }
        let (mut instance, pending) = {
            let descriptor = match name {
                Some(name) => source.view_model_named(name),
                None => source.default_view_model(),
            }
            .ok_or_else(|| ServerError::NotFound {
                kind: ResourceKind::ViewModelInstance,
                name: name.unwrap_or("<default>").to_owned(),
            })?;
            ViewModelInstance::instantiate(descriptor)
        };
        for default in pending {
            match default {
                PendingDefault::Instance { property, view_model } => {
                    let child =
                        self.instantiate_view_model(source, Some(&view_model), depth + 1)?;
                    instance
                        .fill_default(&property, PropertyValue::Instance(Some(child)))
                        .map_err(|e| map_vm(&property, e))?;
                }
                PendingDefault::Asset { property, name } => {
                    match self.asset_names.get(&name) {
                        Some(&asset) => instance
                            .fill_default(&property, PropertyValue::Asset(Some(asset)))
                            .map_err(|e| map_vm(&property, e))?,
                        // Tolerated, same as unresolved import references.
                        None => log::debug!("asset default {name:?} is not registered"),
                    }
                }
            }
        }
        Ok(self.instances.insert(&mut self.allocator, instance))
    }

    /// Walk a property path from a root instance down to the instance that
    /// owns the leaf property. Returns that owner and the leaf name.
    fn resolve_owner(
        &self,
        root: InstanceHandle,
        text: &str,
    ) -> Result<(InstanceHandle, String), ServerError> {
        let bad = |reason: String| ServerError::Path {
            path: text.to_owned(),
            reason,
        };
        let path = PropertyPath::parse(text).map_err(|e| bad(e.to_string()))?;
        let (walk, leaf) = path.split_leaf();
        let mut current = root;
        let mut i = 0;
        while i < walk.len() {
            let Segment::Field(name) = &walk[i] else {
                return Err(bad("lists of lists are not supported".to_owned()));
            };
            let value = self
                .instances
                .get(current)?
                .get(name)
                .ok_or_else(|| bad(format!("no property named {name:?}")))?;
            if let Some(Segment::Index(index)) = walk.get(i + 1) {
                let PropertyValue::List(items) = value else {
                    return Err(bad(format!("property {name:?} is not a list")));
                };
                current = *items.get(*index).ok_or_else(|| {
                    bad(format!(
                        "index {index} out of range for list of length {}",
                        items.len()
                    ))
                })?;
                i += 2;
            } else {
                match value {
                    PropertyValue::Instance(Some(handle)) => current = *handle,
                    PropertyValue::Instance(None) => {
                        return Err(bad(format!("property {name:?} holds no instance")));
                    }
                    _ => return Err(bad(format!("property {name:?} is not an instance"))),
                }
                i += 1;
            }
        }
        Ok((current, leaf.to_owned()))
    }

    /// Apply a list mutation returning the new length, then notify list
    /// subscribers with a snapshot.
    fn mutate_list(
        &mut self,
        instance: InstanceHandle,
        path: String,
        mutate: impl FnOnce(&mut ViewModelInstance, &str) -> Result<usize, VmError>,
    ) -> Result<Event, ServerError> {
        let (owner, leaf) = self.resolve_owner(instance, &path)?;
        let (length, snapshot) = {
            let vm = self.instances.get_mut(owner)?;
            let length = mutate(vm, &leaf).map_err(|e| map_vm(&path, e))?;
            (length, vm.get(&leaf).cloned())
        };
        if let Some(value) = snapshot {
            self.notify(instance, &path, value);
        }
        Ok(Event::ListUpdated { instance, path, length })
    }

    /// Post a change notification if anyone subscribed to this triple.
    fn notify(&self, root: InstanceHandle, path: &str, value: PropertyValue) {
        if self.subscriptions.matches(root, path, value.ty()) {
            self.post(
                0,
                Event::PropertyUpdated {
                    instance: root,
                    path: path.to_owned(),
                    value,
                },
            );
        }
    }

    /// A driver handle on a draw must be alive and belong to the drawn
    /// artboard.
    fn check_driver(
        &self,
        artboard: ArtboardHandle,
        driver: Option<Driver>,
    ) -> Result<(), ServerError> {
        let owner = match driver {
            None => return Ok(()),
            Some(Driver::Machine(machine)) => self.machines.get(machine)?.artboard,
            Some(Driver::Animation(animation)) => self.animations.get(animation)?.artboard,
        };
        if owner != artboard {
            return Err(ServerError::Draw(format!(
                "driver belongs to {owner}, not the drawn {artboard}"
            )));
        }
        Ok(())
    }

    fn execute_draw(&mut self, request: &DrawRequest, present: bool) -> Result<(), ServerError> {
        self.check_driver(request.artboard, request.driver)?;
        let artboard = self.artboards.get(request.artboard)?;
        let target = self.targets.get_mut(request.target)?;
        if let Some(color) = request.clear {
            target.clear(color);
        }
        let transform = fit::compute(
            request.fit,
            request.alignment,
            (artboard.width(), artboard.height()),
            (target.width() as f32, target.height() as f32),
        );
        render::draw_artboard(target, artboard, transform);
        if present {
            self.context.present();
        }
        Ok(())
    }

    fn execute_batch(
        &mut self,
        target: TargetHandle,
        clear: Option<stagehand_core::value::Color>,
        sprites: &[super::command::Sprite],
        flip: bool,
    ) -> Result<(), ServerError> {
        // Validate everything up front so a failing sprite leaves the target
        // untouched rather than half-drawn.
        self.targets.get(target)?;
        for sprite in sprites {
            self.check_driver(sprite.artboard, sprite.driver)?;
            self.artboards.get(sprite.artboard)?;
        }
        if let Some(color) = clear {
            self.targets.get_mut(target)?.clear(color);
        }
        for sprite in sprites {
            let artboard = self.artboards.get(sprite.artboard)?;
            let surface = self.targets.get_mut(target)?;
            let base = fit::compute(
                Fit::Contain,
                Alignment::CENTER,
                (artboard.width(), artboard.height()),
                sprite.size,
            );
            let [a, b, c, d, tx, ty] = sprite.transform;
            let placement = Matrix3::new(a, b, 0.0, c, d, 0.0, tx, ty, 1.0);
            render::draw_artboard(surface, artboard, placement * base);
        }
        if flip {
            self.targets.get_mut(target)?.flip_vertical();
        }
        self.context.present();
        Ok(())
    }

    fn register_asset(&mut self, asset: DecodedAsset) -> AssetHandle {
        let name = asset.name.clone();
        let handle = self.assets.insert(&mut self.allocator, asset);
        if let Some(name) = name {
            // Latest registration under a name wins.
            if let Some(previous) = self.asset_names.insert(name.clone(), handle) {
                log::debug!("asset name {name:?} re-registered (was {previous})");
            }
        }
        handle
    }

    /// Destroy every table in dependency order, then audit file references.
    /// The context drops last, on this thread, as its affinity requires.
    fn teardown(&mut self) {
        log::debug!(
            "tearing down {} artboard(s), {} machine(s), {} animation(s), {} instance(s), {} target(s), {} asset(s)",
            self.artboards.len(),
            self.machines.len(),
            self.animations.len(),
            self.instances.len(),
            self.targets.len(),
            self.assets.len(),
        );
        self.draw_skips.clear();
        self.subscriptions.clear();
        self.animations.clear();
        self.machines.clear();
        self.instances.clear();
        self.targets.clear();
        self.assets.clear();
        self.asset_names.clear();
        self.artboards.clear();
        for (handle, entry) in self.files.drain() {
            let external = Arc::strong_count(&entry.file) - 1;
            if external > 0 {
                log::warn!("file {handle} still referenced {external} time(s) at shutdown");
                debug_assert!(false, "file outlived server shutdown");
            }
        }
        log::debug!(
            "worker shut down after {} presented frame(s)",
            self.context.frames_presented()
        );
    }
}

/// The capability handed to [`super::CommandServer::run_once`] closures:
/// direct, synchronous access to thread-affine resources, executing on the
/// worker thread between queued commands.
pub struct Exec<'a> {
    worker: &'a mut Worker,
}
impl Exec<'_> {
    pub fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        samples: u32,
    ) -> Result<TargetHandle, ServerError> {
        let target = self
            .worker
            .context
            .create_target(width, height, samples)
            .map_err(|e| ServerError::Creation(e.to_string()))?;
        Ok(self.worker.targets.insert(&mut self.worker.allocator, target))
    }
    pub fn delete_render_target(&mut self, target: TargetHandle) -> Result<(), ServerError> {
        self.worker.targets.remove(target).map(|_| ())
    }
    pub fn target_size(&self, target: TargetHandle) -> Result<(u32, u32), ServerError> {
        let surface = self.worker.targets.get(target)?;
        Ok((surface.width(), surface.height()))
    }
    pub fn draw(&mut self, request: &DrawRequest) -> Result<(), ServerError> {
        self.worker.execute_draw(request, true)
    }
    /// Synchronous readback, no message round trip.
    pub fn read_pixels(&self, target: TargetHandle, flip: bool) -> Result<Box<[u8]>, ServerError> {
        Ok(self.worker.targets.get(target)?.to_bytes(flip))
    }
}

fn map_vm(path: &str, error: VmError) -> ServerError {
    match error {
        VmError::TypeMismatch { expected, found, .. } => ServerError::TypeMismatch {
            path: path.to_owned(),
            expected,
            found,
        },
        other => ServerError::Path {
            path: path.to_owned(),
            reason: other.to_string(),
        },
    }
}

//! State machine instances.
//!
//! A machine advances by caller-supplied delta time until it *settles*: no
//! layer has time remaining and nothing has poked it since. The settle
//! transition is reported exactly once per quiet period so per-frame advance
//! loops can stop without polling an idle machine forever.

use smallvec::SmallVec;

use super::{BindingSource, InputDescriptor, StateMachineDescriptor};
use crate::id::Handle;
use crate::vm::ViewModelInstance;

/// A legacy named input. Closed set, matched exhaustively with no runtime
/// type scans.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    Number(f32),
    Boolean(bool),
    Trigger {
        /// Fired since the last advance consumed it.
        pending: bool,
    },
}

struct Layer {
    duration: f32,
    elapsed: f32,
}
impl Layer {
    fn active(&self) -> bool {
        self.elapsed < self.duration
    }
}

struct Binding {
    path: String,
    source: BindingSource,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pointer {
    x: f32,
    y: f32,
    down: bool,
}

/// What one advance did. `writes` are data-binding outputs the server routes
/// to the bound view-model instance (and from there through the subscription
/// registry); the machine itself never touches another resource's state.
#[derive(Debug, Default)]
pub struct Advancement {
    /// The machine settled *on this advance*. Reported once per quiet period.
    pub settled_now: bool,
    /// `(path, value)` pairs to write to the bound instance.
    pub writes: SmallVec<[(String, f32); 2]>,
}

pub struct StateMachine {
    name: String,
    inputs: Vec<(String, Input)>,
    layers: SmallVec<[Layer; 2]>,
    bindings: Vec<Binding>,
    bound: Option<Handle<ViewModelInstance>>,
    pointer: Option<Pointer>,
    /// Input or pointer activity since the last advance; forces at least one
    /// more active advance.
    poked: bool,
    /// The current quiet period has already been reported.
    settle_notified: bool,
    total_elapsed: f32,
}
impl StateMachine {
    #[must_use]
    pub fn instantiate(descriptor: &StateMachineDescriptor) -> Self {
        let inputs = descriptor
            .inputs
            .iter()
            .map(|input| match input {
                InputDescriptor::Number { name, default } => {
                    (name.clone(), Input::Number(*default))
                }
                InputDescriptor::Boolean { name, default } => {
                    (name.clone(), Input::Boolean(*default))
                }
                InputDescriptor::Trigger { name } => {
                    (name.clone(), Input::Trigger { pending: false })
                }
            })
            .collect();
        Self {
            name: descriptor.name.clone(),
            inputs,
            layers: descriptor
                .layers
                .iter()
                .map(|layer| Layer {
                    duration: layer.duration.max(0.0),
                    elapsed: 0.0,
                })
                .collect(),
            bindings: descriptor
                .bindings
                .iter()
                .map(|binding| Binding {
                    path: binding.path.clone(),
                    source: binding.source.clone(),
                })
                .collect(),
            bound: None,
            pointer: None,
            poked: false,
            settle_notified: false,
            total_elapsed: 0.0,
        }
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn bound(&self) -> Option<Handle<ViewModelInstance>> {
        self.bound
    }
    pub fn bind(&mut self, instance: Handle<ViewModelInstance>) {
        self.bound = Some(instance);
        self.wake();
    }

    /// Set the named number input. Returns `false` when the name is unknown
    /// or carries a different type; the caller ignores that silently - the
    /// legacy compatibility contract, not a bug.
    pub fn set_number(&mut self, name: &str, value: f32) -> bool {
        match self.find(name) {
            Some(Input::Number(current)) => {
                *current = value;
                self.wake();
                true
            }
            _ => false,
        }
    }
    /// Set the named boolean input. Same silent-miss contract as
    /// [`Self::set_number`].
    pub fn set_boolean(&mut self, name: &str, value: bool) -> bool {
        match self.find(name) {
            Some(Input::Boolean(current)) => {
                *current = value;
                self.wake();
                true
            }
            _ => false,
        }
    }
    /// Fire the named trigger input. Same silent-miss contract as
    /// [`Self::set_number`].
    pub fn fire_trigger(&mut self, name: &str) -> bool {
        match self.find(name) {
            Some(Input::Trigger { pending }) => {
                *pending = true;
                self.wake();
                true
            }
            _ => false,
        }
    }
    fn find(&mut self, name: &str) -> Option<&mut Input> {
        // Linear scan by name - input lists are tiny.
        self.inputs
            .iter_mut()
            .find_map(|(n, input)| (n == name).then_some(input))
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) {
        let down = self.pointer.is_some_and(|p| p.down);
        self.pointer = Some(Pointer { x, y, down });
        self.wake();
    }
    pub fn pointer_down(&mut self, x: f32, y: f32) {
        self.pointer = Some(Pointer { x, y, down: true });
        self.wake();
    }
    pub fn pointer_up(&mut self, x: f32, y: f32) {
        self.pointer = Some(Pointer { x, y, down: false });
        self.wake();
    }
    /// Last reported pointer position, if any pointer event has arrived.
    #[must_use]
    pub fn pointer_position(&self) -> Option<(f32, f32)> {
        self.pointer.map(|p| (p.x, p.y))
    }
    #[must_use]
    pub fn pointer_pressed(&self) -> bool {
        self.pointer.is_some_and(|p| p.down)
    }

    fn wake(&mut self) {
        self.poked = true;
        self.settle_notified = false;
    }

    /// Settled means advancing again is a no-op until new input arrives.
    #[must_use]
    pub fn needs_advance(&self) -> bool {
        self.poked || self.layers.iter().any(Layer::active)
    }
    /// Seconds of active advancement so far.
    #[must_use]
    pub fn elapsed(&self) -> f32 {
        self.total_elapsed
    }

    /// Step internal time by `delta` seconds (already converted from whatever
    /// granularity the caller used).
    pub fn advance(&mut self, delta: f32) -> Advancement {
        let delta = if delta.is_finite() { delta.max(0.0) } else { 0.0 };
        let was_active = self.needs_advance();

        if was_active {
            self.total_elapsed += delta;
            for layer in &mut self.layers {
                if layer.active() {
                    layer.elapsed = (layer.elapsed + delta).min(layer.duration);
                }
            }
            // Consume pending pokes: triggers fire for exactly one advance.
            for (_, input) in &mut self.inputs {
                if let Input::Trigger { pending } = input {
                    *pending = false;
                }
            }
            self.poked = false;
        }

        let mut advancement = Advancement::default();
        if was_active {
            for binding in &self.bindings {
                let value = match &binding.source {
                    BindingSource::ElapsedSeconds => Some(self.total_elapsed),
                    BindingSource::NumberInput(name) => {
                        self.inputs.iter().find_map(|(n, input)| match input {
                            Input::Number(v) if n == name => Some(*v),
                            _ => None,
                        })
                    }
                };
                if let Some(value) = value {
                    advancement.writes.push((binding.path.clone(), value));
                }
            }
        }
        if !self.needs_advance() && !self.settle_notified {
            self.settle_notified = true;
            advancement.settled_now = true;
        }
        advancement
    }
}

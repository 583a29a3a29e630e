//! Linear animation instances.
//!
//! The simple alternative to a state machine: one timeline, advanced directly.
//! An artboard should be driven by exactly one driver per frame; the server
//! enforces that by construction, since each advance command names its driver.

/// How the timeline behaves at its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LoopMode {
    /// Play once and stop.
    OneShot,
    /// Wrap around to the start.
    Loop,
    /// Bounce between the ends, flipping direction.
    PingPong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

pub struct LinearAnimation {
    name: String,
    duration: f32,
    loop_mode: LoopMode,
    direction: Direction,
    time: f32,
    playing: bool,
}
impl LinearAnimation {
    #[must_use]
    pub fn instantiate(descriptor: &super::AnimationDescriptor) -> Self {
        let duration = descriptor.duration.max(0.0);
        Self {
            name: descriptor.name.clone(),
            duration,
            loop_mode: descriptor.loop_mode,
            direction: Direction::Forward,
            // A zero-length timeline is finished before it starts.
            time: 0.0,
            playing: duration > 0.0,
        }
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// Step by `delta` seconds. Returns whether the animation is still
    /// playing; a finished one-shot stays finished no matter how often it is
    /// advanced.
    pub fn advance(&mut self, delta: f32) -> bool {
        if !self.playing {
            return false;
        }
        let delta = if delta.is_finite() { delta.max(0.0) } else { 0.0 };
        let signed = match self.direction {
            Direction::Forward => delta,
            Direction::Backward => -delta,
        };
        self.time += signed;
        match self.loop_mode {
            LoopMode::OneShot => {
                if self.time >= self.duration {
                    self.time = self.duration;
                    self.playing = false;
                } else if self.time <= 0.0 && matches!(self.direction, Direction::Backward) {
                    self.time = 0.0;
                    self.playing = false;
                }
            }
            LoopMode::Loop => {
                self.time = self.time.rem_euclid(self.duration);
            }
            LoopMode::PingPong => {
                // Reflect off whichever end was crossed, flipping direction
                // each bounce. Large deltas may bounce more than once.
                while self.time < 0.0 || self.time > self.duration {
                    if self.time > self.duration {
                        self.time = 2.0 * self.duration - self.time;
                        self.direction = Direction::Backward;
                    } else {
                        self.time = -self.time;
                        self.direction = Direction::Forward;
                    }
                }
            }
        }
        self.playing
    }
}

//! Server-side walk speed.
//!
//! Walk speed is never set directly. Sources (blocking, enchants, items)
//! attach [`MovementModifier`]s; the state folds them over the base speed in
//! descending priority order and eases the character toward the folded
//! target. Easing is sampled from the clock on demand rather than stepped by
//! a frame loop.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::time::Clock;

pub const BASE_WALK_SPEED: f64 = 16.0;

/// Ramp-up toward a higher speed.
const SPEEDUP_MS: u64 = 1000;
/// Drop toward a lower speed.
const SLOWDOWN_MS: u64 = 300;

/// One speed transformation. Higher priority runs earlier in the fold.
#[derive(Clone)]
pub struct MovementModifier {
    pub priority: i32,
    pub compute: Arc<dyn Fn(f64) -> f64 + Send + Sync>,
}

impl MovementModifier {
    pub fn scale(priority: i32, factor: f64) -> Self {
        Self {
            priority,
            compute: Arc::new(move |speed| speed * factor),
        }
    }
}

struct Registered {
    id: u64,
    modifier: MovementModifier,
}

struct Tween {
    from: f64,
    to: f64,
    start_ms: u64,
    duration_ms: u64,
}

impl Tween {
    /// Quadratic ease-out sample at `now`.
    fn sample(&self, now_ms: u64) -> f64 {
        if self.duration_ms == 0 || now_ms >= self.start_ms + self.duration_ms {
            return self.to;
        }
        let t = now_ms.saturating_sub(self.start_ms) as f64 / self.duration_ms as f64;
        let eased = 1.0 - (1.0 - t) * (1.0 - t);
        self.from + (self.to - self.from) * eased
    }
}

struct Inner {
    base: f64,
    modifiers: Vec<Registered>,
    next_id: u64,
    tween: Option<Tween>,
}

impl Inner {
    fn target(&self) -> f64 {
        let mut sorted: Vec<&Registered> = self.modifiers.iter().collect();
        sorted.sort_by(|a, b| b.modifier.priority.cmp(&a.modifier.priority).then(a.id.cmp(&b.id)));
        let folded = sorted
            .iter()
            .fold(self.base, |speed, entry| (entry.modifier.compute)(speed));
        folded.max(0.0)
    }

    fn current(&self, now_ms: u64) -> f64 {
        match &self.tween {
            Some(tween) => tween.sample(now_ms),
            None => self.target(),
        }
    }

    /// Starts easing toward the refolded target. `from` is the speed sampled
    /// before the modifier list or base changed; sampling after the change
    /// would collapse the tween onto the new target and snap.
    fn retarget(&mut self, from: f64, now_ms: u64) {
        let to = self.target();
        if (from - to).abs() < f64::EPSILON {
            self.tween = None;
            return;
        }
        let duration_ms = if to > from { SPEEDUP_MS } else { SLOWDOWN_MS };
        self.tween = Some(Tween {
            from,
            to,
            start_ms: now_ms,
            duration_ms,
        });
    }
}

/// Cloneable handle over one player's movement state.
#[derive(Clone)]
pub struct ServerMovementState {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
}

/// Removes its modifier when disposed. Dropping without disposing leaves the
/// modifier attached.
pub struct MovementModifierHandle {
    id: u64,
    state: ServerMovementState,
    disposed: bool,
}

impl MovementModifierHandle {
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.state.remove(self.id);
        }
    }
}

impl ServerMovementState {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                base: BASE_WALK_SPEED,
                modifiers: Vec::new(),
                next_id: 0,
                tween: None,
            })),
            clock,
        }
    }

    pub fn add_modifier(&self, modifier: MovementModifier) -> MovementModifierHandle {
        let now = self.clock.now_ms();
        let id = {
            let mut inner = self.inner.lock();
            let from = inner.current(now);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.modifiers.push(Registered { id, modifier });
            inner.retarget(from, now);
            id
        };
        MovementModifierHandle {
            id,
            state: self.clone(),
            disposed: false,
        }
    }

    fn remove(&self, id: u64) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        let from = inner.current(now);
        inner.modifiers.retain(|entry| entry.id != id);
        inner.retarget(from, now);
    }

    /// Replaces the base walk speed and eases toward the refolded target.
    pub fn set_base_speed(&self, base: f64) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        let from = inner.current(now);
        inner.base = base;
        inner.retarget(from, now);
    }

    /// Speed the folded modifiers settle at once easing finishes.
    pub fn target_speed(&self) -> f64 {
        self.inner.lock().target()
    }

    /// Eased speed at the current clock reading.
    pub fn current_speed(&self) -> f64 {
        self.inner.lock().current(self.clock.now_ms())
    }
}

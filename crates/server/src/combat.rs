//! Per-player swing bookkeeping.
//!
//! Tracks the active swing window, per-victim damage timestamps and the
//! one-shot attack-speed boost that enchants may grant for the next swing.
//! Snapshots of this state replicate to clients through a [`SnapshotSink`].
//!
//! [`SnapshotSink`]: crate::oracle::SnapshotSink

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use combat_core::PlayerId;

use crate::oracle::SnapshotSink;
use crate::time::Clock;

/// One in-flight swing, in clock milliseconds.
#[derive(Debug, Clone)]
pub struct ActiveSwing {
    pub started_ms: u64,
    pub cooldown_ms: u64,
    /// Absolute time the damage window opens.
    pub window_open_ms: u64,
    /// Absolute time the damage window closes.
    pub window_close_ms: u64,
}

/// Client-visible combat state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombatSnapshot {
    pub version: u64,
    pub swinging: bool,
    pub swing_ends_ms: Option<u64>,
    pub blocking: bool,
}

struct Inner {
    swing: Option<ActiveSwing>,
    /// When each victim last actually took damage from this player. Spans
    /// swings; stamped only once a hit applies.
    last_damaged: HashMap<PlayerId, u64>,
    blocking: bool,
    /// Multiplier consumed by the next swing's cooldown, then reset to 1.
    next_swing_speed: f64,
    version: u64,
}

/// Cloneable handle over one player's combat state.
#[derive(Clone)]
pub struct ServerCombatState {
    player: PlayerId,
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn SnapshotSink>,
}

impl ServerCombatState {
    pub fn new(player: PlayerId, clock: Arc<dyn Clock>, sink: Arc<dyn SnapshotSink>) -> Self {
        Self {
            player,
            inner: Arc::new(Mutex::new(Inner {
                swing: None,
                last_damaged: HashMap::new(),
                blocking: false,
                next_swing_speed: 1.0,
                version: 0,
            })),
            clock,
            sink,
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Starts a swing. Returns the effective cooldown, or `None` if the
    /// previous swing has not finished.
    pub fn begin_swing(
        &self,
        base_cooldown_ms: u64,
        window: Option<(u64, u64)>,
    ) -> Option<u64> {
        let now = self.clock.now_ms();
        let cooldown = {
            let mut inner = self.inner.lock();
            if let Some(swing) = &inner.swing {
                if now < swing.started_ms + swing.cooldown_ms {
                    return None;
                }
            }
            let speed = inner.next_swing_speed.max(f64::MIN_POSITIVE);
            inner.next_swing_speed = 1.0;
            // Enchants may speed a swing up, never below the floor.
            let cooldown = ((base_cooldown_ms as f64 / speed) as u64).max(50);
            let (open, close) = match window {
                Some((open, close)) => (now + open.min(cooldown), now + close.min(cooldown)),
                None => (now, now + cooldown),
            };
            inner.swing = Some(ActiveSwing {
                started_ms: now,
                cooldown_ms: cooldown,
                window_open_ms: open,
                window_close_ms: close,
            });
            inner.version += 1;
            cooldown
        };
        self.sync();
        Some(cooldown)
    }

    /// True while a swing's cooldown is running.
    pub fn is_swinging(&self) -> bool {
        let now = self.clock.now_ms();
        self.inner
            .lock()
            .swing
            .as_ref()
            .is_some_and(|swing| now < swing.started_ms + swing.cooldown_ms)
    }

    /// True when the current swing's damage window is open and `victim` last
    /// took damage from this player at least one full cooldown ago. Both
    /// gates must pass; neither consumes anything, so a hit that ends up
    /// parried or cancelled leaves them open.
    pub fn can_hit(&self, victim: PlayerId) -> bool {
        let now = self.clock.now_ms();
        let inner = self.inner.lock();
        let Some(swing) = inner.swing.as_ref() else {
            return false;
        };
        if now < swing.window_open_ms || now > swing.window_close_ms {
            return false;
        }
        inner
            .last_damaged
            .get(&victim)
            .is_none_or(|&stamp| now.saturating_sub(stamp) >= swing.cooldown_ms)
    }

    /// Stamps `victim` as damaged now. Callers stamp only after the hit
    /// actually applied.
    pub fn mark_damaged(&self, victim: PlayerId) {
        let now = self.clock.now_ms();
        self.inner.lock().last_damaged.insert(victim, now);
    }

    /// Grants a one-shot attack speed multiplier for the next swing.
    pub fn set_next_swing_speed(&self, multiplier: f64) {
        self.inner.lock().next_swing_speed = multiplier;
    }

    pub fn set_blocking(&self, blocking: bool) {
        {
            let mut inner = self.inner.lock();
            if inner.blocking == blocking {
                return;
            }
            inner.blocking = blocking;
            inner.version += 1;
        }
        self.sync();
    }

    pub fn is_blocking(&self) -> bool {
        self.inner.lock().blocking
    }

    pub fn snapshot(&self) -> CombatSnapshot {
        let inner = self.inner.lock();
        CombatSnapshot {
            version: inner.version,
            swinging: inner
                .swing
                .as_ref()
                .is_some_and(|s| self.clock.now_ms() < s.started_ms + s.cooldown_ms),
            swing_ends_ms: inner.swing.as_ref().map(|s| s.started_ms + s.cooldown_ms),
            blocking: inner.blocking,
        }
    }

    /// Publishes the current snapshot to the replication sink.
    pub fn sync(&self) {
        let snapshot = self.snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => self.sink.publish(self.player, json),
            Err(error) => {
                tracing::warn!(target: "combat::state", player = %self.player, %error, "snapshot serialization failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::NullSink;
    use crate::time::ManualClock;

    fn state(clock: Arc<ManualClock>) -> ServerCombatState {
        ServerCombatState::new(PlayerId(1), clock, Arc::new(NullSink))
    }

    #[test]
    fn swing_rejected_while_cooldown_runs() {
        let clock = ManualClock::new();
        let combat = state(Arc::clone(&clock));

        assert_eq!(combat.begin_swing(1000, None), Some(1000));
        assert!(combat.begin_swing(1000, None).is_none());
        clock.advance(1000);
        assert!(combat.begin_swing(1000, None).is_some());
    }

    #[test]
    fn next_swing_speed_is_consumed_once() {
        let clock = ManualClock::new();
        let combat = state(Arc::clone(&clock));

        combat.set_next_swing_speed(2.0);
        assert_eq!(combat.begin_swing(1000, None), Some(500));
        clock.advance(500);
        assert_eq!(combat.begin_swing(1000, None), Some(1000));
    }

    #[test]
    fn cooldown_never_drops_below_floor() {
        let clock = ManualClock::new();
        let combat = state(clock);
        combat.set_next_swing_speed(100.0);
        assert_eq!(combat.begin_swing(1000, None), Some(50));
    }

    #[test]
    fn damage_window_and_victim_cooldown_both_gate() {
        let clock = ManualClock::new();
        let combat = state(Arc::clone(&clock));
        combat.begin_swing(1000, Some((100, 400)));

        let victim = PlayerId(2);
        clock.advance(50);
        assert!(!combat.can_hit(victim), "window not open yet");
        clock.advance(100);
        assert!(combat.can_hit(victim));
        combat.mark_damaged(victim);
        assert!(!combat.can_hit(victim), "damaged too recently");
        assert!(combat.can_hit(PlayerId(3)));
        clock.advance(400);
        assert!(!combat.can_hit(PlayerId(4)), "window closed");
    }

    #[test]
    fn gate_stays_open_until_damage_actually_lands() {
        let clock = ManualClock::new();
        let combat = state(Arc::clone(&clock));
        combat.begin_swing(1000, None);

        let victim = PlayerId(2);
        assert!(combat.can_hit(victim));
        assert!(combat.can_hit(victim), "checking consumes nothing");
        combat.mark_damaged(victim);
        assert!(!combat.can_hit(victim));
    }

    #[test]
    fn victim_cooldown_spans_swings() {
        let clock = ManualClock::new();
        let combat = state(Arc::clone(&clock));
        let victim = PlayerId(2);

        combat.begin_swing(1000, None);
        clock.advance(600);
        combat.mark_damaged(victim);

        clock.advance(400);
        combat.begin_swing(1000, None);
        assert!(!combat.can_hit(victim), "damaged 400ms ago, cooldown 1000");
        clock.advance(600);
        assert!(combat.can_hit(victim));
    }

    #[test]
    fn snapshot_round_trips() {
        let clock = ManualClock::new();
        let combat = state(clock);
        combat.begin_swing(800, None);
        combat.set_blocking(true);

        let snapshot = combat.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: CombatSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert!(back.swinging);
        assert!(back.blocking);
    }
}

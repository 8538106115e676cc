//! External world seams.
//!
//! The combat engine never talks to the presentation layer directly. Health,
//! animation metadata, knockback impulses and state replication all go
//! through the oracle traits here, so the engine stays testable without a
//! game world behind it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use combat_core::PlayerId;

/// Mutable health pool for one character.
#[derive(Debug, Clone, Copy)]
pub struct Health {
    pub current: f64,
    pub max: f64,
}

impl Health {
    pub fn full(max: f64) -> Self {
        Self { current: max, max }
    }

    /// Applies `amount` of damage (negative amounts heal). Clamps to `0..=max`.
    pub fn damage(&mut self, amount: f64) {
        self.current = (self.current - amount).clamp(0.0, self.max);
    }

    pub fn heal(&mut self, amount: f64) {
        self.damage(-amount);
    }

    pub fn is_dead(&self) -> bool {
        self.current <= 0.0
    }
}

pub type HealthHandle = Arc<Mutex<Health>>;

/// Resolves characters to their health pools.
pub trait CharacterOracle: Send + Sync {
    fn health(&self, player: PlayerId) -> Option<HealthHandle>;
}

/// In-memory character table. Doubles as the production implementation for
/// a single-process server and as the test double.
#[derive(Default)]
pub struct CharacterDirectory {
    characters: Mutex<HashMap<PlayerId, HealthHandle>>,
}

impl CharacterDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spawn(&self, player: PlayerId, max_health: f64) -> HealthHandle {
        let handle = Arc::new(Mutex::new(Health::full(max_health)));
        self.characters.lock().insert(player, Arc::clone(&handle));
        handle
    }

    pub fn despawn(&self, player: PlayerId) {
        self.characters.lock().remove(&player);
    }
}

impl CharacterOracle for CharacterDirectory {
    fn health(&self, player: PlayerId) -> Option<HealthHandle> {
        self.characters.lock().get(&player).cloned()
    }
}

/// Which animation a character is asked to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimationAction {
    Use,
    Block,
}

/// Timing metadata for a swing animation, in clip-local milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct AnimationClip {
    pub length_ms: u64,
    /// Offset at which the damage window opens.
    pub damage_start_ms: u64,
    /// Offset at which the damage window closes.
    pub damage_end_ms: u64,
}

/// Looks up animation metadata for an item's actions.
pub trait AnimationOracle: Send + Sync {
    fn clip(&self, item_id: &str, action: AnimationAction) -> Option<AnimationClip>;
}

/// Reports no metadata, which makes the damage window span the whole swing.
pub struct NullAnimations;

impl AnimationOracle for NullAnimations {
    fn clip(&self, _item_id: &str, _action: AnimationAction) -> Option<AnimationClip> {
        None
    }
}

/// Impulse applied to a hit victim.
#[derive(Debug, Clone, Copy)]
pub struct KnockbackSpec {
    pub horizontal: f64,
    pub vertical: f64,
    pub duration_ms: u64,
}

impl Default for KnockbackSpec {
    fn default() -> Self {
        Self {
            horizontal: 3000.0,
            vertical: 10.0,
            duration_ms: 100,
        }
    }
}

/// Pushes knockback impulses out to the physics layer.
pub trait KnockbackSink: Send + Sync {
    fn knockback(&self, attacker: PlayerId, victim: PlayerId, spec: KnockbackSpec);
}

/// Receives replicated per-player state for clients.
pub trait SnapshotSink: Send + Sync {
    fn publish(&self, player: PlayerId, snapshot_json: String);
}

/// Discards everything. Used when no presentation layer is attached.
pub struct NullSink;

impl KnockbackSink for NullSink {
    fn knockback(&self, _attacker: PlayerId, _victim: PlayerId, _spec: KnockbackSpec) {}
}

impl SnapshotSink for NullSink {
    fn publish(&self, _player: PlayerId, _snapshot_json: String) {}
}

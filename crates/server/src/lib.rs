//! Server-authoritative combat runtime.
//!
//! This crate hosts the stateful side of the combat system: per-player
//! swing, block, movement and inventory state, the damage coordinator that
//! resolves hits through [`combat_core`] pipelines, and the built-in enchant
//! set. External concerns (health pools, animation metadata, physics,
//! replication) sit behind the oracle traits in [`oracle`], so the whole
//! runtime runs headless under a manual clock in tests.

pub mod block;
pub mod combat;
pub mod coordinator;
pub mod enchants;
pub mod handler;
pub mod inventory;
pub mod movement;
pub mod oracle;
pub mod player;
pub mod scheduler;
pub mod time;

pub use block::{BlockError, DEFAULT_BLOCK_PRIORITY, ServerBlockState, WeakBlockState};
pub use combat::{ActiveSwing, CombatSnapshot, ServerCombatState};
pub use coordinator::{PlayerPipelines, ServerDamageCoordinator};
pub use enchants::{
    CombatDeps, ServerEnchantBinding, ServerEnchantRegistry, register_builtin_enchants,
};
pub use handler::{CombatHandler, MIN_SWING_COOLDOWN_MS, SwingError};
pub use inventory::{
    InventoryError, InventorySnapshot, LIFESTEAL_PRIORITY, ServerInventoryState, SlotPolicy,
};
pub use movement::{BASE_WALK_SPEED, MovementModifier, MovementModifierHandle, ServerMovementState};
pub use oracle::{
    AnimationAction, AnimationClip, AnimationOracle, CharacterDirectory, CharacterOracle, Health,
    HealthHandle, KnockbackSink, KnockbackSpec, NullAnimations, NullSink, SnapshotSink,
};
pub use player::{CombatServices, PlayerRepository, ServerPlayerState};
pub use scheduler::{ManualScheduler, Scheduler, TaskHandle, TokioScheduler};
pub use time::{Clock, ManualClock, SystemClock};

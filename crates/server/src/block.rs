//! Blocking and parrying.
//!
//! A block is a defensive stance tied to the currently equipped item. While
//! it holds, a defender-pipeline modifier intercepts incoming hits: inside
//! the parry window the hit is cancelled outright and a counter is queued,
//! afterwards the hit is scaled by the item's block multiplier. Blocking
//! also slows the defender through a movement modifier.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use combat_core::{
    BlockConfig, BlockReaction, DamageContext, PipelineDisposer, PlayerId, QueuedHit,
    resolve_block_config,
};

use crate::combat::ServerCombatState;
use crate::coordinator::ServerDamageCoordinator;
use crate::inventory::ServerInventoryState;
use crate::movement::{MovementModifier, MovementModifierHandle, ServerMovementState};
use crate::time::Clock;

/// Defender pipeline priority when the item config does not set one.
pub const DEFAULT_BLOCK_PRIORITY: i32 = 50;

/// Walk speed factor while blocking.
const BLOCK_SPEED_FACTOR: f64 = 0.5;
const BLOCK_SPEED_PRIORITY: i32 = 100;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("already blocking")]
    AlreadyBlocking,
    #[error("no item equipped")]
    NoItemEquipped,
    #[error("equipped item cannot block")]
    CannotBlock,
    #[error("equipped item is disabled")]
    ItemDisabled,
    #[error("cannot block mid-swing")]
    MidSwing,
}

struct ActiveBlock {
    item_uuid: Uuid,
    config: BlockConfig,
    started_ms: u64,
    defender: PipelineDisposer,
    slow: MovementModifierHandle,
}

pub(crate) struct BlockShared {
    owner: PlayerId,
    combat: ServerCombatState,
    movement: ServerMovementState,
    coordinator: ServerDamageCoordinator,
    inventory: ServerInventoryState,
    clock: Arc<dyn Clock>,
    active: Mutex<Option<ActiveBlock>>,
}

/// Cloneable handle over one player's block stance.
#[derive(Clone)]
pub struct ServerBlockState {
    shared: Arc<BlockShared>,
}

/// Non-owning handle, used by the inventory to end a block on equip changes
/// without keeping the block state alive.
#[derive(Clone)]
pub struct WeakBlockState {
    shared: Weak<BlockShared>,
}

impl WeakBlockState {
    pub fn upgrade(&self) -> Option<ServerBlockState> {
        self.shared.upgrade().map(|shared| ServerBlockState { shared })
    }
}

impl ServerBlockState {
    pub fn new(
        owner: PlayerId,
        combat: ServerCombatState,
        movement: ServerMovementState,
        coordinator: ServerDamageCoordinator,
        inventory: ServerInventoryState,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(BlockShared {
                owner,
                combat,
                movement,
                coordinator,
                inventory,
                clock,
                active: Mutex::new(None),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakBlockState {
        WeakBlockState {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    /// Raises the block stance with the currently equipped item.
    pub fn begin_block(&self) -> Result<(), BlockError> {
        let shared = &self.shared;
        if shared.active.lock().is_some() {
            return Err(BlockError::AlreadyBlocking);
        }
        if shared.combat.is_swinging() {
            return Err(BlockError::MidSwing);
        }
        let (instance, def) = shared
            .inventory
            .equipped()
            .ok_or(BlockError::NoItemEquipped)?;
        if shared.inventory.is_disabled(instance.uuid) {
            return Err(BlockError::ItemDisabled);
        }
        let config = resolve_block_config(&instance, &def);
        if !config.enabled {
            return Err(BlockError::CannotBlock);
        }

        let priority = config.defender_priority.unwrap_or(DEFAULT_BLOCK_PRIORITY);
        let weak = Arc::downgrade(shared);
        let defender = shared
            .coordinator
            .pipelines(shared.owner)
            .defender
            .register_fn(priority, move |context: &mut DamageContext| {
                if let Some(shared) = weak.upgrade() {
                    intercept(&shared, context);
                }
            });
        let slow = shared
            .movement
            .add_modifier(MovementModifier::scale(BLOCK_SPEED_PRIORITY, BLOCK_SPEED_FACTOR));

        *shared.active.lock() = Some(ActiveBlock {
            item_uuid: instance.uuid,
            config,
            started_ms: shared.clock.now_ms(),
            defender,
            slow,
        });
        shared.combat.set_blocking(true);
        tracing::debug!(target: "combat::block", player = %shared.owner, item = %def.id, "block raised");
        Ok(())
    }

    /// Lowers the block stance. No-op when not blocking.
    pub fn end_block(&self) {
        let taken = self.shared.active.lock().take();
        if let Some(mut active) = taken {
            active.defender.dispose();
            active.slow.dispose();
            self.shared.combat.set_blocking(false);
            tracing::debug!(target: "combat::block", player = %self.shared.owner, "block lowered");
        }
    }
}

/// Resolves one incoming hit against the active block.
///
/// The stance lock is released before the item reaction runs, because
/// destroying or disabling the blocking item re-enters this state through
/// the inventory's equip refresh.
fn intercept(shared: &BlockShared, context: &mut DamageContext) {
    let (outcome, parried, item_uuid) = {
        let active = shared.active.lock();
        let Some(active) = active.as_ref() else { return };
        let elapsed = shared.clock.now_ms().saturating_sub(active.started_ms);
        let parried = elapsed <= active.config.parry_window_ms;
        let outcome = if parried {
            active.config.parry
        } else {
            active.config.block
        };
        (outcome, parried, active.item_uuid)
    };

    // Only a parry counters; an ordinary block just scales the hit down.
    if parried {
        context.cancelled = true;
        if outcome.counter_damage > 0.0 {
            context.queue_hit(QueuedHit {
                attacker: shared.owner,
                victim: context.attacker,
                base_damage: outcome.counter_damage,
                final_damage: Some(outcome.counter_damage),
            });
        }
    } else {
        context.final_damage *= outcome.damage_multiplier;
    }
    tracing::debug!(
        target: "combat::block",
        player = %shared.owner,
        attacker = %context.attacker,
        parried,
        counter = outcome.counter_damage,
        "hit intercepted"
    );

    match outcome.reaction {
        BlockReaction::None => {}
        BlockReaction::Break => shared.inventory.destroy_item(item_uuid),
        BlockReaction::Disable {
            duration_ms,
            durability_damage,
        } => {
            shared.inventory.damage_durability(item_uuid, durability_damage);
            shared.inventory.disable_item(item_uuid, duration_ms);
        }
    }
}

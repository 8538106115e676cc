//! Per-player composition and the player table.
//!
//! [`PlayerRepository`] is the composition root: it owns the shared services
//! and wires every state a joining player needs, in dependency order, then
//! unwires them on leave.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use combat_core::{Attribute, ItemRepository, PlayerId, attribute_value};

use crate::block::ServerBlockState;
use crate::combat::ServerCombatState;
use crate::coordinator::ServerDamageCoordinator;
use crate::enchants::{CombatDeps, ServerEnchantRegistry};
use crate::handler::CombatHandler;
use crate::inventory::{ServerInventoryState, SlotPolicy};
use crate::movement::ServerMovementState;
use crate::oracle::{
    AnimationOracle, CharacterDirectory, CharacterOracle, HealthHandle, KnockbackSink,
    NullAnimations, NullSink, SnapshotSink,
};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::time::{Clock, SystemClock};

/// Ambient services shared by every player.
#[derive(Clone)]
pub struct CombatServices {
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn Scheduler>,
    pub animations: Arc<dyn AnimationOracle>,
    pub knockback: Arc<dyn KnockbackSink>,
    pub snapshots: Arc<dyn SnapshotSink>,
}

impl CombatServices {
    /// Production defaults; animation, knockback and replication backends
    /// start as no-ops until the presentation layer installs real ones.
    pub fn production() -> Self {
        Self {
            clock: Arc::new(SystemClock::new()),
            scheduler: Arc::new(TokioScheduler),
            animations: Arc::new(NullAnimations),
            knockback: Arc::new(NullSink),
            snapshots: Arc::new(NullSink),
        }
    }
}

/// Everything combat knows about one connected player.
#[derive(Clone)]
pub struct ServerPlayerState {
    pub player: PlayerId,
    pub health: HealthHandle,
    pub combat: ServerCombatState,
    pub movement: ServerMovementState,
    pub inventory: ServerInventoryState,
    pub block: ServerBlockState,
    pub handler: CombatHandler,
}

impl ServerPlayerState {
    /// Folded attribute value including the equipped item's modifiers.
    pub fn attribute(&self, attribute: Attribute) -> f64 {
        match self.inventory.equipped() {
            Some((instance, def)) => attribute_value(attribute, Some((&instance, &def))),
            None => attribute_value(attribute, None),
        }
    }

    fn dispose(&self) {
        self.block.end_block();
        self.inventory.dispose();
    }
}

/// Registry of connected players and the shared combat infrastructure.
pub struct PlayerRepository {
    services: CombatServices,
    items: Arc<ItemRepository>,
    registry: Arc<ServerEnchantRegistry>,
    policy: SlotPolicy,
    characters: Arc<CharacterDirectory>,
    coordinator: ServerDamageCoordinator,
    players: Mutex<HashMap<PlayerId, ServerPlayerState>>,
}

impl PlayerRepository {
    pub fn new(
        services: CombatServices,
        items: Arc<ItemRepository>,
        registry: Arc<ServerEnchantRegistry>,
        policy: SlotPolicy,
    ) -> Self {
        let characters = CharacterDirectory::new();
        let coordinator =
            ServerDamageCoordinator::new(Arc::clone(&characters) as Arc<dyn CharacterOracle>);
        Self {
            services,
            items,
            registry,
            policy,
            characters,
            coordinator,
            players: Mutex::new(HashMap::new()),
        }
    }

    pub fn coordinator(&self) -> &ServerDamageCoordinator {
        &self.coordinator
    }

    pub fn characters(&self) -> &Arc<CharacterDirectory> {
        &self.characters
    }

    /// Wires up a joining player. Replaces any previous state under the
    /// same id.
    pub fn add_player(&self, player: PlayerId, max_health: f64) -> ServerPlayerState {
        self.remove_player(player);

        let health = self.characters.spawn(player, max_health);
        let combat = ServerCombatState::new(
            player,
            Arc::clone(&self.services.clock),
            Arc::clone(&self.services.snapshots),
        );
        let movement = ServerMovementState::new(Arc::clone(&self.services.clock));
        let deps = CombatDeps {
            owner: player,
            combat: combat.clone(),
            movement: movement.clone(),
            scheduler: Arc::clone(&self.services.scheduler),
        };
        let inventory = ServerInventoryState::new(
            player,
            self.policy.clone(),
            Arc::clone(&self.items),
            Arc::clone(&self.registry),
            self.coordinator.clone(),
            Arc::clone(&self.characters) as Arc<dyn CharacterOracle>,
            Arc::clone(&self.services.snapshots),
            deps,
        );
        let block = ServerBlockState::new(
            player,
            combat.clone(),
            movement.clone(),
            self.coordinator.clone(),
            inventory.clone(),
            Arc::clone(&self.services.clock),
        );
        inventory.attach_block(block.downgrade());
        let handler = CombatHandler::new(
            player,
            combat.clone(),
            inventory.clone(),
            self.coordinator.clone(),
            Arc::clone(&self.services.animations),
            Arc::clone(&self.services.knockback),
        );

        let state = ServerPlayerState {
            player,
            health,
            combat,
            movement,
            inventory,
            block,
            handler,
        };
        self.players.lock().insert(player, state.clone());
        tracing::info!(target: "combat::players", %player, "player joined combat");
        state
    }

    pub fn get(&self, player: PlayerId) -> Option<ServerPlayerState> {
        self.players.lock().get(&player).cloned()
    }

    /// Unwires a leaving player. No-op for unknown ids.
    pub fn remove_player(&self, player: PlayerId) {
        let Some(state) = self.players.lock().remove(&player) else {
            return;
        };
        state.dispose();
        self.coordinator.remove_player(player);
        self.characters.despawn(player);
        tracing::info!(target: "combat::players", %player, "player left combat");
    }

    pub fn len(&self) -> usize {
        self.players.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.lock().is_empty()
    }
}

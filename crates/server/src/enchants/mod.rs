//! Server enchant wiring and the built-in enchant set.
//!
//! Enchant hooks run against [`DamageContext`] and receive an explicit
//! dependency struct at bind time instead of reaching into globals, so every
//! hook instance is scoped to one player and one equipped item.

mod combo_damage;
mod combo_swift;
mod reality_break;

use std::sync::Arc;

use combat_core::{DamageContext, EnchantBinding, EnchantRegistry, PlayerId, RegistryError};

use crate::combat::ServerCombatState;
use crate::movement::ServerMovementState;
use crate::scheduler::Scheduler;

pub use combo_damage::COMBO_DAMAGE_PRIORITY;
pub use combo_swift::COMBO_SWIFT_PRIORITY;
pub use reality_break::REALITY_BREAK_PRIORITY;

/// Dependencies handed to every enchant binding for one player.
#[derive(Clone)]
pub struct CombatDeps {
    pub owner: PlayerId,
    pub combat: ServerCombatState,
    pub movement: ServerMovementState,
    pub scheduler: Arc<dyn Scheduler>,
}

pub type ServerEnchantBinding = EnchantBinding<CombatDeps>;
pub type ServerEnchantRegistry = EnchantRegistry<CombatDeps, DamageContext>;

/// Populates the registry with the built-in enchants. Called once at
/// bootstrap; a duplicate name is a fatal wiring error.
pub fn register_builtin_enchants(registry: &mut ServerEnchantRegistry) -> Result<(), RegistryError> {
    registry.register(combo_damage::spec())?;
    registry.register(combo_swift::spec())?;
    registry.register(reality_break::spec())?;
    Ok(())
}

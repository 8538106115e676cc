//! Swing and touch entry points.
//!
//! The handler validates client intents against server state: a swing must
//! respect the equipped weapon's attack speed, and a touch only deals damage
//! while the swing's damage window is open. Both read everything they need
//! from the authoritative states rather than trusting the client.

use std::sync::Arc;

use combat_core::{Attribute, DamageContext, PlayerId, attribute_value};

use crate::combat::ServerCombatState;
use crate::coordinator::ServerDamageCoordinator;
use crate::inventory::ServerInventoryState;
use crate::oracle::{AnimationAction, AnimationOracle, KnockbackSink, KnockbackSpec};

/// Lower bound on the effective swing cooldown, whatever the modifiers say.
pub const MIN_SWING_COOLDOWN_MS: u64 = 50;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SwingError {
    #[error("no item equipped")]
    NoItemEquipped,
    #[error("equipped item is disabled")]
    ItemDisabled,
    #[error("cannot swing while blocking")]
    Blocking,
    #[error("swing still on cooldown")]
    OnCooldown,
}

/// Per-player intent handler.
#[derive(Clone)]
pub struct CombatHandler {
    owner: PlayerId,
    combat: ServerCombatState,
    inventory: ServerInventoryState,
    coordinator: ServerDamageCoordinator,
    animations: Arc<dyn AnimationOracle>,
    knockback: Arc<dyn KnockbackSink>,
}

impl CombatHandler {
    pub fn new(
        owner: PlayerId,
        combat: ServerCombatState,
        inventory: ServerInventoryState,
        coordinator: ServerDamageCoordinator,
        animations: Arc<dyn AnimationOracle>,
        knockback: Arc<dyn KnockbackSink>,
    ) -> Self {
        Self {
            owner,
            combat,
            inventory,
            coordinator,
            animations,
            knockback,
        }
    }

    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Starts a swing with the equipped item. Returns the effective
    /// cooldown in milliseconds.
    pub fn handle_swing(&self) -> Result<u64, SwingError> {
        let (instance, def) = self.inventory.equipped().ok_or(SwingError::NoItemEquipped)?;
        if self.inventory.is_disabled(instance.uuid) {
            return Err(SwingError::ItemDisabled);
        }
        if self.combat.is_blocking() {
            return Err(SwingError::Blocking);
        }

        let base_cooldown = attribute_value(Attribute::AttackSpeed, Some((&instance, &def)))
            .max(MIN_SWING_COOLDOWN_MS as f64) as u64;

        // Damage window from the swing animation's markers, scaled onto the
        // effective cooldown. No metadata means the whole swing can hit.
        let window = self
            .animations
            .clip(&def.id, AnimationAction::Use)
            .filter(|clip| clip.length_ms > 0 && clip.damage_end_ms >= clip.damage_start_ms)
            .map(|clip| {
                let scale = |offset_ms: u64| {
                    (offset_ms as f64 / clip.length_ms as f64 * base_cooldown as f64) as u64
                };
                (scale(clip.damage_start_ms), scale(clip.damage_end_ms))
            });

        let cooldown = self
            .combat
            .begin_swing(base_cooldown, window)
            .ok_or(SwingError::OnCooldown)?;
        tracing::debug!(
            target: "combat::handler",
            player = %self.owner,
            item = %def.id,
            cooldown_ms = cooldown,
            "swing started"
        );
        Ok(cooldown)
    }

    /// Reports weapon contact with `victim` during a swing.
    ///
    /// Returns the resolved hit when the touch passed the damage-window and
    /// per-victim cooldown gates, `None` when it was ignored. The victim's
    /// cooldown stamp moves only when damage actually applies, so a parried
    /// or cancelled hit does not lock the victim out.
    pub fn handle_touch(&self, victim: PlayerId) -> Option<DamageContext> {
        if victim == self.owner {
            return None;
        }
        let (instance, def) = self.inventory.equipped()?;
        if !self.combat.can_hit(victim) {
            return None;
        }

        let damage = attribute_value(Attribute::Damage, Some((&instance, &def)));
        let context = self.coordinator.apply(self.owner, victim, damage);
        if context.applied {
            self.combat.mark_damaged(victim);
            self.knockback
                .knockback(self.owner, victim, KnockbackSpec::default());
        }
        Some(context)
    }
}

//! Combo swiftness: landing hits grants a short burst of movement speed.

use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

use combat_core::{
    DamageContext, EnchantHook, EnchantPhase, EnchantSpec, ItemDef, ItemInstance, ItemSubtype,
    ItemType, Matcher, PipelineModifier, Property,
};

use super::{CombatDeps, ServerEnchantBinding};
use crate::movement::{MovementModifier, MovementModifierHandle};
use crate::scheduler::TaskHandle;

pub const COMBO_SWIFT_PRIORITY: i32 = 110;

/// Movement modifier priority for the speed burst.
const SWIFT_SPEED_PRIORITY: i32 = 150;

#[derive(Clone, Copy, Debug, PartialEq)]
struct SwiftTuning {
    cadence: u32,
    factor: f64,
    duration_ms: u64,
}

fn tuning_for_tier(tier: u8) -> Option<SwiftTuning> {
    match tier {
        1 => Some(SwiftTuning { cadence: 3, factor: 1.2, duration_ms: 1400 }),
        2 => Some(SwiftTuning { cadence: 2, factor: 1.25, duration_ms: 1400 }),
        3 => Some(SwiftTuning { cadence: 2, factor: 1.35, duration_ms: 1300 }),
        _ => None,
    }
}

/// An untiered swiftness enchant rides the weapon's combo tier.
fn tier_of(def: &ItemDef) -> Option<u8> {
    def.enchant
        .as_ref()
        .and_then(|enchant| enchant.swift_tier.or(enchant.combo_tier))
}

static TUNING: LazyLock<Property<SwiftTuning>> = LazyLock::new(|| {
    Property::new(|def: &ItemDef, _: &ItemInstance| tier_of(def).and_then(tuning_for_tier))
});

struct ComboSwiftHook {
    binding: Arc<ServerEnchantBinding>,
    priority: i32,
    phase: EnchantPhase,
    hits: u32,
    /// Live speed burst, shared with its scheduled expiry task.
    buff: Arc<Mutex<Option<MovementModifierHandle>>>,
    expiry: Option<TaskHandle>,
}

impl ComboSwiftHook {
    fn clear_buff(&mut self) {
        if let Some(expiry) = self.expiry.take() {
            expiry.cancel();
        }
        if let Some(mut handle) = self.buff.lock().take() {
            handle.dispose();
        }
    }
}

impl PipelineModifier<DamageContext> for ComboSwiftHook {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn apply(&mut self, context: &mut DamageContext) {
        if context.attacker != self.binding.context().owner {
            return;
        }
        let Some(tuning) = self.binding.get(&TUNING) else { return };

        self.hits += 1;
        if self.hits < tuning.cadence {
            return;
        }
        self.hits = 0;

        // A fresh proc replaces the running burst and restarts its timer.
        self.clear_buff();
        let deps = self.binding.context();
        let handle = deps
            .movement
            .add_modifier(MovementModifier::scale(SWIFT_SPEED_PRIORITY, tuning.factor));
        *self.buff.lock() = Some(handle);

        let buff = Arc::clone(&self.buff);
        self.expiry = Some(deps.scheduler.schedule(
            tuning.duration_ms,
            Box::new(move || {
                if let Some(mut handle) = buff.lock().take() {
                    handle.dispose();
                }
            }),
        ));
        tracing::debug!(
            target: "combat::enchant",
            player = %context.attacker,
            factor = tuning.factor,
            duration_ms = tuning.duration_ms,
            "swiftness proc"
        );
    }
}

impl EnchantHook<DamageContext> for ComboSwiftHook {
    fn phase(&self) -> EnchantPhase {
        self.phase
    }

    fn dispose(&mut self) {
        self.clear_buff();
    }
}

pub(super) fn spec() -> EnchantSpec<CombatDeps, DamageContext> {
    EnchantSpec::new(
        "combo_swift",
        EnchantPhase::PostHit,
        COMBO_SWIFT_PRIORITY,
        Matcher::all_of([
            Matcher::item_type(ItemType::Weapon),
            Matcher::subtype(ItemSubtype::Sword),
        ]),
        |binding, priority, phase| {
            Box::new(ComboSwiftHook {
                binding,
                priority,
                phase,
                hits: 0,
                buff: Arc::new(Mutex::new(None)),
                expiry: None,
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_table() {
        assert_eq!(
            tuning_for_tier(1),
            Some(SwiftTuning { cadence: 3, factor: 1.2, duration_ms: 1400 })
        );
        assert_eq!(
            tuning_for_tier(2),
            Some(SwiftTuning { cadence: 2, factor: 1.25, duration_ms: 1400 })
        );
        assert_eq!(
            tuning_for_tier(3),
            Some(SwiftTuning { cadence: 2, factor: 1.35, duration_ms: 1300 })
        );
        assert_eq!(tuning_for_tier(9), None);
    }

    #[test]
    fn tier_falls_back_to_the_combo_tier() {
        let catalog = combat_core::default_catalog();
        let def = |id: &str| catalog.iter().find(|d| d.id == id).unwrap();

        // runed_sword carries only a combo tier; swiftness inherits it.
        assert_eq!(tier_of(def("runed_sword")), Some(1));
        // An explicit swift tier wins over the combo tier.
        assert_eq!(tier_of(def("stormbrand")), Some(1));
        assert_eq!(tier_of(def("iron_sword")), None);
    }
}

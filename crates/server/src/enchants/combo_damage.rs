//! Combo damage: every Nth swing that lands on a target hits harder.

use std::sync::{Arc, LazyLock};

use combat_core::{
    DamageContext, EnchantHook, EnchantPhase, EnchantSpec, ItemDef, ItemInstance, ItemSubtype,
    ItemType, Matcher, PipelineModifier, Property,
};

use super::{CombatDeps, ServerEnchantBinding};

pub const COMBO_DAMAGE_PRIORITY: i32 = 120;

/// Hits between empowered strikes, and the multiplier on the empowered one.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ComboTuning {
    cadence: u32,
    multiplier: f64,
}

fn tuning_for_tier(tier: u8) -> Option<ComboTuning> {
    match tier {
        1 => Some(ComboTuning { cadence: 4, multiplier: 1.2 }),
        2 => Some(ComboTuning { cadence: 3, multiplier: 1.35 }),
        3 => Some(ComboTuning { cadence: 3, multiplier: 1.45 }),
        _ => None,
    }
}

static TUNING: LazyLock<Property<ComboTuning>> = LazyLock::new(|| {
    Property::new(|def: &ItemDef, _: &ItemInstance| {
        def.enchant
            .as_ref()
            .and_then(|enchant| enchant.combo_tier)
            .and_then(tuning_for_tier)
    })
});

struct ComboDamageHook {
    binding: Arc<ServerEnchantBinding>,
    priority: i32,
    phase: EnchantPhase,
    hits: u32,
}

impl PipelineModifier<DamageContext> for ComboDamageHook {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn apply(&mut self, context: &mut DamageContext) {
        // Counter hits and other players' strikes do not advance the combo.
        if context.attacker != self.binding.context().owner {
            return;
        }
        let Some(tuning) = self.binding.get(&TUNING) else { return };

        self.hits += 1;
        if self.hits >= tuning.cadence {
            self.hits = 0;
            context.final_damage *= tuning.multiplier;
            tracing::debug!(
                target: "combat::enchant",
                player = %context.attacker,
                multiplier = tuning.multiplier,
                "combo strike"
            );
        }
    }
}

impl EnchantHook<DamageContext> for ComboDamageHook {
    fn phase(&self) -> EnchantPhase {
        self.phase
    }
}

pub(super) fn spec() -> EnchantSpec<CombatDeps, DamageContext> {
    EnchantSpec::new(
        "combo_damage",
        EnchantPhase::Attacker,
        COMBO_DAMAGE_PRIORITY,
        Matcher::all_of([
            Matcher::item_type(ItemType::Weapon),
            Matcher::subtype(ItemSubtype::Sword),
        ]),
        |binding, priority, phase| {
            Box::new(ComboDamageHook {
                binding,
                priority,
                phase,
                hits: 0,
            })
        },
    )
}

//! Reality break: after enough landed hits, the next swing comes out far
//! faster than the weapon's base attack speed allows.

use std::sync::{Arc, LazyLock};

use combat_core::{
    DamageContext, EnchantHook, EnchantPhase, EnchantSpec, ItemDef, ItemInstance, ItemSubtype,
    ItemType, Matcher, PipelineModifier, Property,
};

use super::{CombatDeps, ServerEnchantBinding};

pub const REALITY_BREAK_PRIORITY: i32 = 105;

#[derive(Clone, Copy, Debug, PartialEq)]
struct BreakTuning {
    cadence: u32,
    speed_multiplier: f64,
}

fn tuning_for_tier(tier: u8) -> Option<BreakTuning> {
    match tier {
        1 => Some(BreakTuning { cadence: 5, speed_multiplier: 2.7 }),
        2 => Some(BreakTuning { cadence: 5, speed_multiplier: 3.6 }),
        3 => Some(BreakTuning { cadence: 4, speed_multiplier: 3.8 }),
        _ => None,
    }
}

/// An untiered reality break rides the weapon's combo tier.
fn tier_of(def: &ItemDef) -> Option<u8> {
    def.enchant
        .as_ref()
        .and_then(|enchant| enchant.reality_break_tier.or(enchant.combo_tier))
}

static TUNING: LazyLock<Property<BreakTuning>> = LazyLock::new(|| {
    Property::new(|def: &ItemDef, _: &ItemInstance| tier_of(def).and_then(tuning_for_tier))
});

struct RealityBreakHook {
    binding: Arc<ServerEnchantBinding>,
    priority: i32,
    phase: EnchantPhase,
    hits: u32,
}

impl PipelineModifier<DamageContext> for RealityBreakHook {
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

        let deps = self.binding.context();
        deps.combat.set_next_swing_speed(tuning.speed_multiplier);
        tracing::debug!(
            target: "combat::enchant",
            player = %context.attacker,
            multiplier = tuning.speed_multiplier,
            "reality break proc"
        );
    }
}

impl EnchantHook<DamageContext> for RealityBreakHook {
    fn phase(&self) -> EnchantPhase {
        self.phase
    }
}

pub(super) fn spec() -> EnchantSpec<CombatDeps, DamageContext> {
    EnchantSpec::new(
        "reality_break",
        EnchantPhase::PostHit,
        REALITY_BREAK_PRIORITY,
        Matcher::all_of([
            Matcher::item_type(ItemType::Weapon),
            Matcher::subtype(ItemSubtype::Sword),
        ]),
        |binding, priority, phase| {
            Box::new(RealityBreakHook {
                binding,
                priority,
                phase,
                hits: 0,
            })
        },
    )
}

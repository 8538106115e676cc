//! Block and parry configuration.
//!
//! Every blockable item resolves to a full [`BlockConfig`]: either the
//! instance carries an override, the definition carries one, or the
//! type/subtype defaults apply. Partially specified configs are merged over
//! the base config so downstream code never deals in `Option` outcomes.

use super::{ItemDef, ItemInstance, ItemSubtype, ItemType};

/// What happens to the blocking item after absorbing a hit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BlockReaction {
    #[default]
    None,
    /// The item is destroyed and blocking ends.
    Break,
    /// The item cannot block again for `duration_ms` and optionally takes
    /// durability damage; blocking ends.
    Disable {
        duration_ms: u64,
        durability_damage: i32,
    },
}

/// Outcome applied to an incoming hit, for either a parry or a plain block.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockOutcome {
    pub damage_multiplier: f64,
    pub counter_damage: f64,
    pub reaction: BlockReaction,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockConfig {
    pub enabled: bool,
    /// Hits landing within this many milliseconds of block start are parried.
    pub parry_window_ms: u64,
    /// Priority of the defender-phase modifier; `None` uses the default (50).
    pub defender_priority: Option<i32>,
    pub parry: BlockOutcome,
    pub block: BlockOutcome,
}

impl BlockConfig {
    /// Disabled baseline: full parry negation, unmitigated block.
    pub const fn base() -> Self {
        Self {
            enabled: false,
            parry_window_ms: 150,
            defender_priority: None,
            parry: BlockOutcome {
                damage_multiplier: 0.0,
                counter_damage: 0.0,
                reaction: BlockReaction::None,
            },
            block: BlockOutcome {
                damage_multiplier: 1.0,
                counter_damage: 0.0,
                reaction: BlockReaction::None,
            },
        }
    }
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self::base()
    }
}

/// Default block behavior for an item type/subtype pair.
///
/// Weapons parry at full negation with a counterattack and halve blocked
/// damage; tools block without a counter; bows trade a short parry window
/// for a disable reaction when used to block.
pub fn default_block_config(item_type: ItemType, subtype: Option<ItemSubtype>) -> BlockConfig {
    let mut config = BlockConfig::base();
    match item_type {
        ItemType::Weapon => {
            config.enabled = true;
            config.parry.counter_damage = 20.0;
            config.block.damage_multiplier = 0.5;
            if subtype == Some(ItemSubtype::Bow) {
                config.parry_window_ms = 100;
                config.parry.counter_damage = 5.0;
                config.block.damage_multiplier = 0.85;
                config.block.reaction = BlockReaction::Disable {
                    duration_ms: 2_000,
                    durability_damage: 4,
                };
            }
        }
        ItemType::Tool => {
            config.enabled = true;
            config.block.damage_multiplier = 0.7;
        }
        ItemType::Resource | ItemType::Armor => {}
    }
    config
}

/// Resolves the config in force for an equipped item.
///
/// Precedence: instance override, then definition override, then the
/// type/subtype defaults.
pub fn resolve_block_config(instance: &ItemInstance, def: &ItemDef) -> BlockConfig {
    if let Some(config) = instance.block {
        return config;
    }
    if let Some(config) = def.block {
        return config;
    }
    default_block_config(def.item_type, def.subtype)
}

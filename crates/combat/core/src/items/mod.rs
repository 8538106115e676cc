//! Item model: definitions, instances, attributes, and block configuration.
//!
//! Definitions describe an item catalog entry; instances are the owned
//! copies living in player inventories. Instances may override the
//! definition's attribute modifiers, effects, block configuration, and
//! durability.

mod block;
mod repository;

pub use block::{
    BlockConfig, BlockOutcome, BlockReaction, default_block_config, resolve_block_config,
};
pub use repository::{ItemRepository, RepositoryError, default_catalog};

use uuid::Uuid;

/// Player-facing attributes items can modify.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Attribute {
    Health,
    Damage,
    /// Swing cooldown in milliseconds. Lower is faster.
    AttackSpeed,
    Fortitude,
    Agility,
    Intelligence,
    Luck,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ItemRarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
    Mythical,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ItemType {
    Weapon,
    Resource,
    Tool,
    Armor,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ItemSubtype {
    Sword,
    Bow,
    Helmet,
    Chestplate,
    Leggings,
    Boots,
}

impl ItemSubtype {
    /// The primary type this subtype belongs to.
    pub const fn item_type(self) -> ItemType {
        match self {
            ItemSubtype::Sword | ItemSubtype::Bow => ItemType::Weapon,
            ItemSubtype::Helmet
            | ItemSubtype::Chestplate
            | ItemSubtype::Leggings
            | ItemSubtype::Boots => ItemType::Armor,
        }
    }
}

/// How an attribute modifier combines with others.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ModifierOp {
    Additive,
    Multiplicative,
    /// Overrides the folded value entirely; the last absolute wins.
    Absolute,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeModifier {
    pub attribute: Attribute,
    pub op: ModifierOp,
    pub value: f64,
}

/// Passive effects attached to an item.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ItemEffect {
    /// Heals the attacker for `fraction` of the damage dealt on each
    /// applied hit.
    Lifesteal { fraction: f64 },
}

/// Enchant tier configuration on an item definition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemEnchantConfig {
    pub combo_tier: Option<u8>,
    pub swift_tier: Option<u8>,
    pub reality_break_tier: Option<u8>,
}

/// Catalog entry describing one kind of item.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemDef {
    pub id: String,
    pub name: String,
    pub description: String,
    pub item_type: ItemType,
    pub subtype: Option<ItemSubtype>,
    pub rarity: ItemRarity,
    pub attr: Vec<AttributeModifier>,
    pub effects: Vec<ItemEffect>,
    pub max_stack: u16,
    pub transferable: bool,
    /// Negative durability means unbreakable.
    pub durability: i32,
    pub block: Option<BlockConfig>,
    pub enchant: Option<ItemEnchantConfig>,
}

/// Owned copy of an item living in an inventory.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemInstance {
    pub uuid: Uuid,
    /// Definition id in the repository.
    pub id: String,
    pub stack: u16,
    /// Instance-specific attribute modifiers, stacked on top of the
    /// definition's.
    pub attr: Vec<AttributeModifier>,
    /// Overrides the definition's effects when present.
    pub effects: Option<Vec<ItemEffect>>,
    /// Overrides the definition's block configuration when present.
    pub block: Option<BlockConfig>,
    pub durability: i32,
}

impl ItemInstance {
    /// Mints a fresh instance of `def` with a new uuid.
    pub fn of(def: &ItemDef, stack: u16) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: def.id.clone(),
            stack,
            attr: Vec::new(),
            effects: None,
            block: None,
            durability: def.durability,
        }
    }

    /// Effects in force for this instance: its own override, else the
    /// definition's.
    pub fn effective_effects<'a>(&'a self, def: &'a ItemDef) -> &'a [ItemEffect] {
        match &self.effects {
            Some(effects) => effects,
            None => &def.effects,
        }
    }
}

/// Baseline modifiers every player carries regardless of equipment.
pub const DEFAULT_ATTR: &[AttributeModifier] = &[AttributeModifier {
    attribute: Attribute::Health,
    op: ModifierOp::Additive,
    value: 100.0,
}];

/// Folds an attribute value from the baseline plus the equipped item.
///
/// Rules: if any matching modifier is absolute, the last absolute wins
/// outright. Otherwise additives are summed and multiplicatives applied to
/// the sum, in that order.
pub fn attribute_value(
    attribute: Attribute,
    equipped: Option<(&ItemInstance, &ItemDef)>,
) -> f64 {
    let mut matching: Vec<&AttributeModifier> = DEFAULT_ATTR
        .iter()
        .filter(|m| m.attribute == attribute)
        .collect();
    if let Some((instance, def)) = equipped {
        matching.extend(instance.attr.iter().filter(|m| m.attribute == attribute));
        matching.extend(def.attr.iter().filter(|m| m.attribute == attribute));
    }

    let mut value = 0.0;
    let mut saw_absolute = false;
    for modifier in matching.iter().filter(|m| m.op == ModifierOp::Absolute) {
        value = modifier.value;
        saw_absolute = true;
    }
    if saw_absolute {
        return value;
    }

    for modifier in matching.iter().filter(|m| m.op == ModifierOp::Additive) {
        value += modifier.value;
    }
    for modifier in matching
        .iter()
        .filter(|m| m.op == ModifierOp::Multiplicative)
    {
        value *= modifier.value;
    }
    value
}

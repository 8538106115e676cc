//! Item definition catalog.

use std::collections::HashMap;

use super::{
    Attribute, AttributeModifier, ItemDef, ItemEffect, ItemEnchantConfig, ItemRarity, ItemSubtype,
    ItemType, ModifierOp,
};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("duplicate item definition '{id}'")]
    DuplicateDefinition { id: String },
    #[error("subtype {subtype} does not belong to item type {item_type}")]
    SubtypeMismatch {
        item_type: ItemType,
        subtype: ItemSubtype,
    },
}

/// Validated map of item definitions keyed by id.
#[derive(Clone, Debug, Default)]
pub struct ItemRepository {
    defs: HashMap<String, ItemDef>,
}

impl ItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a repository from a seed catalog, failing on any invalid entry.
    pub fn with_defs(seed: impl IntoIterator<Item = ItemDef>) -> Result<Self, RepositoryError> {
        let mut repo = Self::new();
        for def in seed {
            repo.register(def)?;
        }
        Ok(repo)
    }

    /// Registers a definition. Duplicate ids and mismatched subtypes are
    /// rejected; both indicate a broken catalog, not a runtime condition.
    pub fn register(&mut self, def: ItemDef) -> Result<(), RepositoryError> {
        if let Some(subtype) = def.subtype {
            if subtype.item_type() != def.item_type {
                return Err(RepositoryError::SubtypeMismatch {
                    item_type: def.item_type,
                    subtype,
                });
            }
        }
        if self.defs.contains_key(&def.id) {
            return Err(RepositoryError::DuplicateDefinition { id: def.id });
        }
        self.defs.insert(def.id.clone(), def);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ItemDef> {
        self.defs.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &ItemDef> {
        self.defs.values()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

fn weapon(
    id: &str,
    name: &str,
    description: &str,
    rarity: ItemRarity,
    attr: Vec<AttributeModifier>,
    effects: Vec<ItemEffect>,
    enchant: Option<ItemEnchantConfig>,
) -> ItemDef {
    ItemDef {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        item_type: ItemType::Weapon,
        subtype: Some(ItemSubtype::Sword),
        rarity,
        attr,
        effects,
        max_stack: 1,
        transferable: true,
        durability: -1,
        block: None,
        enchant,
    }
}

fn damage(value: f64) -> AttributeModifier {
    AttributeModifier {
        attribute: Attribute::Damage,
        op: ModifierOp::Additive,
        value,
    }
}

fn attack_speed(value: f64) -> AttributeModifier {
    AttributeModifier {
        attribute: Attribute::AttackSpeed,
        op: ModifierOp::Additive,
        value,
    }
}

/// Starter catalog: a ladder of swords plus a bow for the disable-reaction
/// block defaults.
pub fn default_catalog() -> Vec<ItemDef> {
    let mut defs = vec![
        weapon(
            "iron_sword",
            "Iron Sword",
            "A dependable, unremarkable blade.",
            ItemRarity::Common,
            vec![damage(5.0), attack_speed(1000.0)],
            vec![],
            None,
        ),
        weapon(
            "runed_sword",
            "Runed Sword",
            "Faint runes pulse along the fuller.",
            ItemRarity::Rare,
            vec![damage(8.0), attack_speed(950.0)],
            vec![],
            Some(ItemEnchantConfig {
                combo_tier: Some(1),
                ..ItemEnchantConfig::default()
            }),
        ),
        weapon(
            "stormbrand",
            "Stormbrand",
            "Hums with barely contained lightning.",
            ItemRarity::Epic,
            vec![damage(12.0), attack_speed(900.0)],
            vec![],
            Some(ItemEnchantConfig {
                combo_tier: Some(2),
                swift_tier: Some(1),
                ..ItemEnchantConfig::default()
            }),
        ),
        weapon(
            "duskrender",
            "Duskrender",
            "Drinks the light around its edge.",
            ItemRarity::Mythical,
            vec![damage(20.0), attack_speed(1000.0)],
            vec![ItemEffect::Lifesteal { fraction: 0.1 }],
            Some(ItemEnchantConfig {
                combo_tier: Some(3),
                swift_tier: Some(3),
                reality_break_tier: Some(2),
            }),
        ),
    ];

    defs.push(ItemDef {
        id: "hunting_bow".into(),
        name: "Hunting Bow".into(),
        description: "Better at range than up close.".into(),
        item_type: ItemType::Weapon,
        subtype: Some(ItemSubtype::Bow),
        rarity: ItemRarity::Common,
        attr: vec![damage(3.0), attack_speed(1200.0)],
        effects: vec![],
        max_stack: 1,
        transferable: true,
        durability: 120,
        block: None,
        enchant: None,
    });

    defs
}

//! Deterministic combat primitives shared across server and tooling.
//!
//! `combat-core` defines the canonical damage-resolution building blocks:
//! the priority-ordered [`pipeline::Pipeline`], the [`combat::DamageContext`]
//! threaded through a resolution, the item model with its block
//! configuration, and the enchant registry/binding machinery. Everything in
//! this crate is pure: no clocks, no I/O, no engine types. The server crate
//! supplies those through its oracle traits and drives these primitives.
pub mod combat;
pub mod enchant;
pub mod items;
pub mod pipeline;

pub use combat::{DamageContext, HitSink, PlayerId, QueuedHit};
pub use enchant::{
    EnchantBinding, EnchantHook, EnchantPhase, EnchantRegistry, EnchantSpec, Matcher, Property,
    RegistryError,
};
pub use items::{
    Attribute, AttributeModifier, BlockConfig, BlockOutcome, BlockReaction, ItemDef, ItemEffect,
    ItemEnchantConfig, ItemInstance, ItemRarity, ItemRepository, ItemSubtype, ItemType,
    ModifierOp, RepositoryError, attribute_value, default_block_config, default_catalog,
    resolve_block_config,
};
pub use pipeline::{Pipeline, PipelineContext, PipelineDisposer, PipelineModifier};

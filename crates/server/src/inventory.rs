//! Server-authoritative inventory.
//!
//! Besides slot bookkeeping, the inventory is where an equipped item's
//! combat behavior is wired up: on every equip change it tears down the
//! previous item's pipeline hooks, ends any active block, and registers the
//! new item's enchant hooks and effects against the damage coordinator.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use combat_core::{
    DamageContext, EnchantBinding, EnchantHook, EnchantPhase, ItemDef, ItemEffect, ItemInstance,
    ItemRepository, PipelineDisposer, PipelineModifier, PlayerId,
};

use crate::block::WeakBlockState;
use crate::coordinator::ServerDamageCoordinator;
use crate::enchants::{CombatDeps, ServerEnchantRegistry};
use crate::oracle::{CharacterOracle, SnapshotSink};
use crate::scheduler::TaskHandle;

/// Post-hit priority of the lifesteal effect.
pub const LIFESTEAL_PRIORITY: i32 = 100;

/// Which slots exist and which of them may be equipped from.
#[derive(Clone, Debug)]
pub struct SlotPolicy {
    pub total_slots: usize,
    pub equippable: Vec<usize>,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            total_slots: 27,
            equippable: (0..9).collect(),
        }
    }
}

impl SlotPolicy {
    fn is_equippable(&self, slot: usize) -> bool {
        self.equippable.contains(&slot)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("inventory is full")]
    Full,
    #[error("slot {slot} does not exist")]
    BadSlot { slot: usize },
    #[error("slot {slot} is empty")]
    EmptySlot { slot: usize },
    #[error("slot {slot} cannot be equipped from")]
    NotEquippable { slot: usize },
    #[error("unknown item definition '{id}'")]
    UnknownItem { id: String },
}

/// Client-visible inventory state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub version: u64,
    pub slots: Vec<Option<ItemInstance>>,
    pub equipped_slot: Option<usize>,
}

type SharedHook = Arc<Mutex<Box<dyn EnchantHook<DamageContext>>>>;

/// Forwards pipeline calls to a hook the inventory also keeps a handle to,
/// so the hook can be disposed after its pipeline registration is removed.
struct HookAdapter {
    priority: i32,
    hook: SharedHook,
}

impl PipelineModifier<DamageContext> for HookAdapter {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn apply(&mut self, context: &mut DamageContext) {
        self.hook.lock().apply(context);
    }
}

#[derive(Default)]
struct EquippedHooks {
    disposers: Vec<PipelineDisposer>,
    hooks: Vec<SharedHook>,
}

struct Inner {
    slots: Vec<Option<ItemInstance>>,
    equipped_slot: Option<usize>,
    version: u64,
    disabled: HashMap<Uuid, TaskHandle>,
    equipped_hooks: Option<EquippedHooks>,
    block: Option<WeakBlockState>,
}

struct InventoryShared {
    owner: PlayerId,
    policy: SlotPolicy,
    repository: Arc<ItemRepository>,
    registry: Arc<ServerEnchantRegistry>,
    coordinator: ServerDamageCoordinator,
    characters: Arc<dyn CharacterOracle>,
    sink: Arc<dyn SnapshotSink>,
    deps: CombatDeps,
    inner: Mutex<Inner>,
}

/// Cloneable handle over one player's inventory.
#[derive(Clone)]
pub struct ServerInventoryState {
    shared: Arc<InventoryShared>,
}

impl ServerInventoryState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: PlayerId,
        policy: SlotPolicy,
        repository: Arc<ItemRepository>,
        registry: Arc<ServerEnchantRegistry>,
        coordinator: ServerDamageCoordinator,
        characters: Arc<dyn CharacterOracle>,
        sink: Arc<dyn SnapshotSink>,
        deps: CombatDeps,
    ) -> Self {
        let slots = vec![None; policy.total_slots];
        Self {
            shared: Arc::new(InventoryShared {
                owner,
                policy,
                repository,
                registry,
                coordinator,
                characters,
                sink,
                deps,
                inner: Mutex::new(Inner {
                    slots,
                    equipped_slot: None,
                    version: 0,
                    disabled: HashMap::new(),
                    equipped_hooks: None,
                    block: None,
                }),
            }),
        }
    }

    /// Late-bound link to the block stance; breaks the construction cycle
    /// between the two states.
    pub fn attach_block(&self, block: WeakBlockState) {
        self.shared.inner.lock().block = Some(block);
    }

    /// Adds an item, merging into existing stacks of the same definition
    /// before taking an empty slot.
    pub fn add_item(&self, mut instance: ItemInstance) -> Result<usize, InventoryError> {
        let def = self
            .shared
            .repository
            .get(&instance.id)
            .ok_or_else(|| InventoryError::UnknownItem {
                id: instance.id.clone(),
            })?;
        let max_stack = def.max_stack;

        let slot = {
            let mut inner = self.shared.inner.lock();
            let mut merged = None;
            if max_stack > 1 {
                for (index, slot) in inner.slots.iter_mut().enumerate() {
                    let Some(item) = slot else { continue };
                    if item.id == instance.id && item.stack < max_stack {
                        let moved = (max_stack - item.stack).min(instance.stack);
                        item.stack += moved;
                        instance.stack -= moved;
                        if instance.stack == 0 {
                            merged = Some(index);
                            break;
                        }
                    }
                }
            }
            match merged {
                Some(slot) => slot,
                None => {
                    let slot = inner
                        .slots
                        .iter()
                        .position(Option::is_none)
                        .ok_or(InventoryError::Full)?;
                    inner.slots[slot] = Some(instance);
                    slot
                }
            }
        };
        self.bump_and_sync();
        Ok(slot)
    }

    pub fn move_item(&self, from: usize, to: usize) -> Result<(), InventoryError> {
        let needs_refresh = {
            let mut inner = self.shared.inner.lock();
            let total = inner.slots.len();
            for slot in [from, to] {
                if slot >= total {
                    return Err(InventoryError::BadSlot { slot });
                }
            }
            inner.slots.swap(from, to);
            // The equipped pointer follows its item; landing outside the
            // equippable range drops the item back to carried state.
            match inner.equipped_slot {
                Some(slot) if slot == from || slot == to => {
                    let landed = if slot == from { to } else { from };
                    if self.shared.policy.is_equippable(landed) {
                        inner.equipped_slot = Some(landed);
                        false
                    } else {
                        inner.equipped_slot = None;
                        true
                    }
                }
                _ => false,
            }
        };
        if needs_refresh {
            self.refresh();
        }
        self.bump_and_sync();
        Ok(())
    }

    pub fn equip(&self, slot: usize) -> Result<(), InventoryError> {
        {
            let mut inner = self.shared.inner.lock();
            if slot >= inner.slots.len() {
                return Err(InventoryError::BadSlot { slot });
            }
            if !self.shared.policy.is_equippable(slot) {
                return Err(InventoryError::NotEquippable { slot });
            }
            if inner.slots[slot].is_none() {
                return Err(InventoryError::EmptySlot { slot });
            }
            if inner.equipped_slot == Some(slot) {
                return Ok(());
            }
            inner.equipped_slot = Some(slot);
        }
        self.refresh();
        self.bump_and_sync();
        Ok(())
    }

    pub fn unequip(&self) {
        let changed = {
            let mut inner = self.shared.inner.lock();
            inner.equipped_slot.take().is_some()
        };
        if changed {
            self.refresh();
            self.bump_and_sync();
        }
    }

    /// Currently equipped item and its definition.
    pub fn equipped(&self) -> Option<(ItemInstance, Arc<ItemDef>)> {
        let instance = {
            let inner = self.shared.inner.lock();
            let slot = inner.equipped_slot?;
            inner.slots.get(slot)?.clone()?
        };
        let def = Arc::new(self.shared.repository.get(&instance.id)?.clone());
        Some((instance, def))
    }

    pub fn is_disabled(&self, uuid: Uuid) -> bool {
        self.shared.inner.lock().disabled.contains_key(&uuid)
    }

    /// Removes the item from whatever slot holds it.
    pub fn destroy_item(&self, uuid: Uuid) {
        let was_equipped = {
            let mut inner = self.shared.inner.lock();
            let Some(slot) = inner
                .slots
                .iter()
                .position(|entry| entry.as_ref().is_some_and(|item| item.uuid == uuid))
            else {
                return;
            };
            inner.slots[slot] = None;
            if let Some(timer) = inner.disabled.remove(&uuid) {
                timer.cancel();
            }
            if inner.equipped_slot == Some(slot) {
                inner.equipped_slot = None;
                true
            } else {
                false
            }
        };
        tracing::debug!(target: "combat::inventory", player = %self.shared.owner, item = %uuid, "item destroyed");
        if was_equipped {
            self.refresh();
        }
        self.bump_and_sync();
    }

    /// Deducts durability; the item is destroyed when it runs out. Items
    /// with negative durability are unbreakable.
    pub fn damage_durability(&self, uuid: Uuid, amount: i32) {
        if amount <= 0 {
            return;
        }
        let destroyed = {
            let mut inner = self.shared.inner.lock();
            let Some(item) = inner
                .slots
                .iter_mut()
                .flatten()
                .find(|item| item.uuid == uuid)
            else {
                return;
            };
            if item.durability < 0 {
                return;
            }
            item.durability -= amount;
            item.durability <= 0
        };
        if destroyed {
            self.destroy_item(uuid);
        } else {
            self.bump_and_sync();
        }
    }

    /// Makes the item unusable for `duration_ms`. A disabled equipped item
    /// also drops any block raised with it.
    pub fn disable_item(&self, uuid: Uuid, duration_ms: u64) {
        let shared = Arc::downgrade(&self.shared);
        let timer = self.shared.deps.scheduler.schedule(
            duration_ms,
            Box::new(move || {
                if let Some(shared) = Weak::upgrade(&shared) {
                    shared.inner.lock().disabled.remove(&uuid);
                }
            }),
        );

        let (block, equipped_disabled) = {
            let mut inner = self.shared.inner.lock();
            if let Some(previous) = inner.disabled.insert(uuid, timer) {
                previous.cancel();
            }
            let equipped_disabled = inner
                .equipped_slot
                .and_then(|slot| inner.slots.get(slot))
                .and_then(Option::as_ref)
                .is_some_and(|item| item.uuid == uuid);
            (inner.block.clone(), equipped_disabled)
        };
        tracing::debug!(target: "combat::inventory", player = %self.shared.owner, item = %uuid, duration_ms, "item disabled");
        if equipped_disabled {
            if let Some(block) = block.and_then(|weak| weak.upgrade()) {
                block.end_block();
            }
        }
    }

    pub fn snapshot(&self) -> InventorySnapshot {
        let inner = self.shared.inner.lock();
        InventorySnapshot {
            version: inner.version,
            slots: inner.slots.clone(),
            equipped_slot: inner.equipped_slot,
        }
    }

    /// Replaces the inventory contents from a snapshot, re-resolving the
    /// equip wiring against the current catalog.
    pub fn load(&self, snapshot: InventorySnapshot) -> Result<(), InventoryError> {
        for item in snapshot.slots.iter().flatten() {
            if self.shared.repository.get(&item.id).is_none() {
                return Err(InventoryError::UnknownItem {
                    id: item.id.clone(),
                });
            }
        }
        if let Some(slot) = snapshot.equipped_slot {
            if slot >= snapshot.slots.len() || !self.shared.policy.is_equippable(slot) {
                return Err(InventoryError::NotEquippable { slot });
            }
            if snapshot.slots[slot].is_none() {
                return Err(InventoryError::EmptySlot { slot });
            }
        }
        {
            let mut inner = self.shared.inner.lock();
            let mut slots = snapshot.slots;
            slots.resize(self.shared.policy.total_slots, None);
            inner.slots = slots;
            inner.equipped_slot = snapshot.equipped_slot;
        }
        self.refresh();
        self.bump_and_sync();
        Ok(())
    }

    /// Tears down all combat wiring. Called when the player leaves.
    pub fn dispose(&self) {
        let (old, block, timers) = {
            let mut inner = self.shared.inner.lock();
            inner.equipped_slot = None;
            let timers: Vec<TaskHandle> = inner.disabled.drain().map(|(_, timer)| timer).collect();
            (inner.equipped_hooks.take(), inner.block.take(), timers)
        };
        for timer in timers {
            timer.cancel();
        }
        if let Some(block) = block.and_then(|weak| weak.upgrade()) {
            block.end_block();
        }
        teardown(old);
    }

    /// Bumps the change counter and publishes a fresh snapshot.
    fn bump_and_sync(&self) {
        let snapshot = {
            let mut inner = self.shared.inner.lock();
            inner.version += 1;
            InventorySnapshot {
                version: inner.version,
                slots: inner.slots.clone(),
                equipped_slot: inner.equipped_slot,
            }
        };
        match serde_json::to_string(&snapshot) {
            Ok(json) => self.shared.sink.publish(self.shared.owner, json),
            Err(error) => {
                tracing::warn!(target: "combat::inventory", player = %self.shared.owner, %error, "snapshot serialization failed");
            }
        }
    }

    /// Re-resolves the equipped item's combat wiring.
    ///
    /// Any active block ends first, since its config belongs to the item
    /// that is no longer (or no longer certainly) equipped. Old hooks are
    /// disposed outside the inventory lock; hook disposal may touch
    /// movement and scheduler state.
    fn refresh(&self) {
        let shared = &self.shared;
        let (old, block) = {
            let mut inner = shared.inner.lock();
            (inner.equipped_hooks.take(), inner.block.clone())
        };
        if let Some(block) = block.and_then(|weak| weak.upgrade()) {
            block.end_block();
        }
        teardown(old);

        let Some((instance, def)) = self.equipped() else {
            return;
        };

        let binding = Arc::new(EnchantBinding::new(
            Arc::clone(&def),
            instance.clone(),
            shared.deps.clone(),
        ));
        let pipelines = shared.coordinator.pipelines(shared.owner);
        let mut record = EquippedHooks::default();

        for hook in shared.registry.collect_hooks(&binding, None) {
            let phase = hook.phase();
            let priority = hook.priority();
            let hook: SharedHook = Arc::new(Mutex::new(hook));
            let adapter = HookAdapter {
                priority,
                hook: Arc::clone(&hook),
            };
            let pipeline = match phase {
                EnchantPhase::Attacker => &pipelines.attacker,
                EnchantPhase::Defender => &pipelines.defender,
                EnchantPhase::PostHit => &pipelines.post_hit,
            };
            record.disposers.push(pipeline.register(adapter));
            record.hooks.push(hook);
        }

        for effect in instance.effective_effects(&def) {
            match effect {
                ItemEffect::Lifesteal { fraction } => {
                    let fraction = *fraction;
                    let owner = shared.owner;
                    let characters = Arc::clone(&shared.characters);
                    record.disposers.push(pipelines.post_hit.register_fn(
                        LIFESTEAL_PRIORITY,
                        move |context: &mut DamageContext| {
                            if context.attacker != owner {
                                return;
                            }
                            if let Some(health) = characters.health(owner) {
                                health.lock().heal(fraction * context.final_damage);
                            }
                        },
                    ));
                }
            }
        }

        tracing::debug!(
            target: "combat::inventory",
            player = %shared.owner,
            item = %def.id,
            hooks = record.hooks.len(),
            "equip wiring refreshed"
        );
        shared.inner.lock().equipped_hooks = Some(record);
    }
}

fn teardown(record: Option<EquippedHooks>) {
    let Some(mut record) = record else { return };
    for disposer in &mut record.disposers {
        disposer.dispose();
    }
    for hook in &record.hooks {
        hook.lock().dispose();
    }
}

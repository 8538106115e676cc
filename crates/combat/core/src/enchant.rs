//! Enchant registry, matchers, properties, and bindings.
//!
//! An enchant is a matcher-gated behavior attached to qualifying items that
//! hooks into one damage phase. The registry is populated explicitly at
//! startup (no hidden load-order side effects); duplicate registrations are
//! a bootstrap error. At equip time the server creates an
//! [`EnchantBinding`] for the item and asks the registry to instantiate one
//! fresh hook per matching enchant, so hook state (hit counters, pending
//! timers) is never shared across items or players.
//!
//! Properties separate pure, memoized configuration lookup from the stateful
//! hook instance: a [`Property`] is a pure function of the bound item
//! definition/instance, resolved at most once per binding.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::items::{ItemDef, ItemInstance, ItemSubtype, ItemType};
use crate::pipeline::{PipelineContext, PipelineModifier};

/// Damage-resolution phase an enchant hooks into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EnchantPhase {
    Attacker,
    Defender,
    PostHit,
}

/// Default hook priority when a registration does not care.
pub const DEFAULT_PRIORITY: i32 = 50;

// ============================================================================
// Matchers
// ============================================================================

/// Boolean expression tree over an item's type and subtype.
///
/// Kept as data rather than closures so registrations are inspectable and
/// trivially composable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    /// Matches every item.
    Any,
    ItemTypes(Vec<ItemType>),
    ItemSubtypes(Vec<ItemSubtype>),
    AllOf(Vec<Matcher>),
    AnyOf(Vec<Matcher>),
    Not(Box<Matcher>),
}

impl Matcher {
    pub fn item_type(item_type: ItemType) -> Self {
        Matcher::ItemTypes(vec![item_type])
    }

    pub fn subtype(subtype: ItemSubtype) -> Self {
        Matcher::ItemSubtypes(vec![subtype])
    }

    pub fn all_of(matchers: impl IntoIterator<Item = Matcher>) -> Self {
        Matcher::AllOf(matchers.into_iter().collect())
    }

    pub fn any_of(matchers: impl IntoIterator<Item = Matcher>) -> Self {
        Matcher::AnyOf(matchers.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(matcher: Matcher) -> Self {
        Matcher::Not(Box::new(matcher))
    }

    pub fn matches(&self, def: &ItemDef) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::ItemTypes(types) => types.contains(&def.item_type),
            Matcher::ItemSubtypes(subtypes) => def
                .subtype
                .is_some_and(|subtype| subtypes.contains(&subtype)),
            Matcher::AllOf(matchers) => matchers.iter().all(|m| m.matches(def)),
            Matcher::AnyOf(matchers) => matchers.iter().any(|m| m.matches(def)),
            Matcher::Not(matcher) => !matcher.matches(def),
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

static NEXT_PROPERTY_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PropertyId(u64);

impl PropertyId {
    fn next() -> Self {
        Self(NEXT_PROPERTY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type PropertyResolver<V> = Arc<dyn Fn(&ItemDef, &ItemInstance) -> Option<V> + Send + Sync>;

/// Pure, identity-keyed configuration lookup over a bound item.
///
/// Resolvers must not carry mutable cross-call state; stateful behavior
/// belongs on the hook instance. Cloning a property preserves its identity,
/// so every clone shares the same memoization slot.
pub struct Property<V> {
    id: PropertyId,
    resolver: PropertyResolver<V>,
}

impl<V> Clone for Property<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<V> Property<V> {
    pub fn new(
        resolver: impl Fn(&ItemDef, &ItemInstance) -> Option<V> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: PropertyId::next(),
            resolver: Arc::new(resolver),
        }
    }
}

impl Property<f64> {
    /// Numeric property clamped to `[min, max]` after resolution.
    pub fn clamped(
        min: f64,
        max: f64,
        resolver: impl Fn(&ItemDef, &ItemInstance) -> Option<f64> + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |def, instance| resolver(def, instance).map(|v| v.clamp(min, max)))
    }
}

// ============================================================================
// Bindings
// ============================================================================

/// Runtime association between one equipped item and its enchant behaviors.
///
/// `Ctx` is the dependency struct injected at bind time (player, inventory,
/// movement, coordinator handles on the server). Lives as long as the item
/// stays equipped; re-equip disposes the binding and every hook built from
/// it.
pub struct EnchantBinding<Ctx> {
    definition: Arc<ItemDef>,
    instance: ItemInstance,
    context: Ctx,
    cache: Mutex<HashMap<PropertyId, Box<dyn Any + Send>>>,
}

impl<Ctx> EnchantBinding<Ctx> {
    pub fn new(definition: Arc<ItemDef>, instance: ItemInstance, context: Ctx) -> Self {
        Self {
            definition,
            instance,
            context,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn definition(&self) -> &ItemDef {
        &self.definition
    }

    pub fn instance(&self) -> &ItemInstance {
        &self.instance
    }

    /// Dependencies injected when the binding was created.
    pub fn context(&self) -> &Ctx {
        &self.context
    }

    /// Resolves a property against this binding, memoized by property
    /// identity: the resolver runs at most once per binding lifetime.
    pub fn get<V>(&self, property: &Property<V>) -> Option<V>
    where
        V: Clone + Send + 'static,
    {
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(&property.id) {
            return cached
                .downcast_ref::<Option<V>>()
                .cloned()
                .unwrap_or_default();
        }
        let value = (property.resolver)(&self.definition, &self.instance);
        cache.insert(property.id, Box::new(value.clone()));
        value
    }
}

impl<Ctx> std::fmt::Debug for EnchantBinding<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnchantBinding")
            .field("definition", &self.definition.id)
            .field("instance", &self.instance.uuid)
            .finish()
    }
}

// ============================================================================
// Hooks & registry
// ============================================================================

/// A pipeline modifier produced by an enchant registration.
///
/// `dispose` runs when the owning binding is torn down; hooks that schedule
/// timers or register movement modifiers clean them up here.
pub trait EnchantHook<T: PipelineContext>: PipelineModifier<T> {
    fn phase(&self) -> EnchantPhase;

    fn dispose(&mut self) {}
}

type HookFactory<Ctx, T> =
    Arc<dyn Fn(Arc<EnchantBinding<Ctx>>, i32, EnchantPhase) -> Box<dyn EnchantHook<T>> + Send + Sync>;

/// One registered enchant: matcher, phase, priority, and hook constructor.
pub struct EnchantSpec<Ctx, T: PipelineContext> {
    pub name: &'static str,
    pub phase: EnchantPhase,
    pub priority: i32,
    pub matcher: Matcher,
    pub factory: HookFactory<Ctx, T>,
}

impl<Ctx, T: PipelineContext> EnchantSpec<Ctx, T> {
    pub fn new(
        name: &'static str,
        phase: EnchantPhase,
        priority: i32,
        matcher: Matcher,
        factory: impl Fn(Arc<EnchantBinding<Ctx>>, i32, EnchantPhase) -> Box<dyn EnchantHook<T>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name,
            phase,
            priority,
            matcher,
            factory: Arc::new(factory),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two registrations share a name. Registration-time invariant
    /// violation; the bootstrap propagates this as fatal.
    #[error("duplicate enchant registration '{name}'")]
    DuplicateRegistration { name: &'static str },
}

/// Explicitly populated enchant table.
///
/// `Ctx` is the binding dependency struct, `T` the pipeline context the
/// hooks operate on.
pub struct EnchantRegistry<Ctx, T: PipelineContext> {
    entries: Vec<EnchantSpec<Ctx, T>>,
}

impl<Ctx, T: PipelineContext> Default for EnchantRegistry<Ctx, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ctx, T: PipelineContext> EnchantRegistry<Ctx, T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, spec: EnchantSpec<Ctx, T>) -> Result<(), RegistryError> {
        if self.entries.iter().any(|entry| entry.name == spec.name) {
            return Err(RegistryError::DuplicateRegistration { name: spec.name });
        }
        self.entries.push(spec);
        Ok(())
    }

    /// Instantiates one fresh hook per registration whose matcher accepts
    /// the bound item, optionally restricted to a phase set.
    pub fn collect_hooks(
        &self,
        binding: &Arc<EnchantBinding<Ctx>>,
        phases: Option<&[EnchantPhase]>,
    ) -> Vec<Box<dyn EnchantHook<T>>> {
        self.entries
            .iter()
            .filter(|spec| phases.is_none_or(|phases| phases.contains(&spec.phase)))
            .filter(|spec| spec.matcher.matches(binding.definition()))
            .map(|spec| (spec.factory)(Arc::clone(binding), spec.priority, spec.phase))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

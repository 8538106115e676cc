//! End-to-end combat flows under a manual clock and scheduler.

use std::sync::Arc;

use parking_lot::Mutex;

use combat_core::{
    BlockConfig, BlockReaction, ItemInstance, ItemRepository, PlayerId, default_block_config,
    default_catalog,
};
use combat_server::{
    BlockError, Clock, CombatServices, KnockbackSink, KnockbackSpec, ManualClock, ManualScheduler,
    NullAnimations, NullSink, PlayerRepository, ServerEnchantRegistry, ServerPlayerState,
    SlotPolicy, SwingError, register_builtin_enchants,
};

#[derive(Default)]
struct RecordingKnockback {
    impulses: Mutex<Vec<(PlayerId, PlayerId)>>,
}

impl KnockbackSink for RecordingKnockback {
    fn knockback(&self, attacker: PlayerId, victim: PlayerId, _spec: KnockbackSpec) {
        self.impulses.lock().push((attacker, victim));
    }
}

struct Arena {
    clock: Arc<ManualClock>,
    scheduler: Arc<ManualScheduler>,
    knockback: Arc<RecordingKnockback>,
    items: Arc<ItemRepository>,
    players: PlayerRepository,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Arena {
    fn new() -> Self {
        init_tracing();
        let clock = ManualClock::new();
        let scheduler = ManualScheduler::new();
        let knockback = Arc::new(RecordingKnockback::default());
        let items = Arc::new(ItemRepository::with_defs(default_catalog()).unwrap());

        let mut registry = ServerEnchantRegistry::new();
        register_builtin_enchants(&mut registry).unwrap();

        let services = CombatServices {
            clock: Arc::clone(&clock) as _,
            scheduler: Arc::clone(&scheduler) as _,
            animations: Arc::new(NullAnimations),
            knockback: Arc::clone(&knockback) as _,
            snapshots: Arc::new(NullSink),
        };
        let players = PlayerRepository::new(
            services,
            Arc::clone(&items),
            Arc::new(registry),
            SlotPolicy::default(),
        );
        Self {
            clock,
            scheduler,
            knockback,
            items,
            players,
        }
    }

    /// Advances the clock and fires every timer that came due.
    fn advance(&self, ms: u64) {
        self.clock.advance(ms);
        self.scheduler.run_due(self.clock.now_ms());
    }

    fn join(&self, id: u64) -> ServerPlayerState {
        self.players.add_player(PlayerId(id), 100.0)
    }

    fn give_equipped(&self, state: &ServerPlayerState, item_id: &str) -> ItemInstance {
        let def = self.items.get(item_id).unwrap();
        let instance = ItemInstance::of(def, 1);
        let slot = state.inventory.add_item(instance.clone()).unwrap();
        state.inventory.equip(slot).unwrap();
        instance
    }
}

fn health_of(state: &ServerPlayerState) -> f64 {
    state.health.lock().current
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn swing_and_touch_applies_weapon_damage() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let victim = arena.join(2);
    arena.give_equipped(&attacker, "iron_sword");

    assert_eq!(attacker.handler.handle_swing(), Ok(1000));
    let context = attacker.handler.handle_touch(victim.player).unwrap();
    assert!(context.applied);
    assert!(close(health_of(&victim), 95.0));
    assert_eq!(arena.knockback.impulses.lock().len(), 1);

    // The victim was damaged too recently for a second hit.
    assert!(attacker.handler.handle_touch(victim.player).is_none());
    assert_eq!(attacker.handler.handle_swing(), Err(SwingError::OnCooldown));

    arena.advance(1000);
    assert_eq!(attacker.handler.handle_swing(), Ok(1000));
    attacker.handler.handle_touch(victim.player).unwrap();
    assert!(close(health_of(&victim), 90.0));
}

#[test]
fn swing_gates() {
    let arena = Arena::new();
    let player = arena.join(1);
    assert_eq!(player.handler.handle_swing(), Err(SwingError::NoItemEquipped));

    arena.give_equipped(&player, "iron_sword");
    player.block.begin_block().unwrap();
    assert_eq!(player.handler.handle_swing(), Err(SwingError::Blocking));

    player.block.end_block();
    assert!(player.handler.handle_swing().is_ok());
}

#[test]
fn block_lifecycle_errors() {
    let arena = Arena::new();
    let player = arena.join(1);
    assert_eq!(player.block.begin_block(), Err(BlockError::NoItemEquipped));

    arena.give_equipped(&player, "iron_sword");
    player.handler.handle_swing().unwrap();
    assert_eq!(player.block.begin_block(), Err(BlockError::MidSwing));

    arena.advance(1000);
    player.block.begin_block().unwrap();
    assert_eq!(player.block.begin_block(), Err(BlockError::AlreadyBlocking));
    assert!(player.combat.is_blocking());

    player.block.end_block();
    player.block.end_block();
    assert!(!player.combat.is_blocking());
}

#[test]
fn block_cycle_restores_modifier_counts() {
    let arena = Arena::new();
    let player = arena.join(1);
    arena.give_equipped(&player, "iron_sword");

    let defender = arena.players.coordinator().pipelines(player.player).defender;
    let baseline = defender.len();
    let speed = player.movement.target_speed();

    for _ in 0..3 {
        player.block.begin_block().unwrap();
        assert_eq!(defender.len(), baseline + 1);
        player.block.end_block();
        assert_eq!(defender.len(), baseline);
    }
    assert!(close(player.movement.target_speed(), speed));
}

#[test]
fn parry_inside_window_cancels_and_counters() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let defender = arena.join(2);
    arena.give_equipped(&attacker, "iron_sword");
    arena.give_equipped(&defender, "iron_sword");

    defender.block.begin_block().unwrap();
    arena.advance(80);

    attacker.handler.handle_swing().unwrap();
    let context = attacker.handler.handle_touch(defender.player).unwrap();

    assert!(context.cancelled);
    assert!(!context.applied);
    assert!(close(health_of(&defender), 100.0));
    // The counter resolved as its own hit against the attacker.
    assert!(close(health_of(&attacker), 80.0));
    assert!(arena.knockback.impulses.lock().is_empty());
}

#[test]
fn overridden_parry_counter_hits_for_25() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let defender = arena.join(2);
    arena.give_equipped(&attacker, "iron_sword");

    let def = arena.items.get("iron_sword").unwrap();
    let mut instance = ItemInstance::of(def, 1);
    let mut config = default_block_config(def.item_type, def.subtype);
    config.parry.counter_damage = 25.0;
    instance.block = Some(config);
    let slot = defender.inventory.add_item(instance).unwrap();
    defender.inventory.equip(slot).unwrap();

    defender.block.begin_block().unwrap();
    arena.advance(80);
    attacker.handler.handle_swing().unwrap();
    let context = attacker.handler.handle_touch(defender.player).unwrap();

    assert!(context.cancelled);
    assert!(close(health_of(&defender), 100.0));
    assert!(close(health_of(&attacker), 75.0));
}

#[test]
fn counter_hits_run_the_attackers_defender_pipeline() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let defender = arena.join(2);
    arena.give_equipped(&attacker, "iron_sword");
    arena.give_equipped(&defender, "iron_sword");

    // Counters are full hits: the original attacker's own defenses apply.
    let _ward = arena
        .players
        .coordinator()
        .pipelines(attacker.player)
        .defender
        .register_fn(50, |context: &mut combat_core::DamageContext| {
            context.final_damage *= 0.5;
        });

    defender.block.begin_block().unwrap();
    arena.advance(80);
    attacker.handler.handle_swing().unwrap();
    attacker.handler.handle_touch(defender.player).unwrap();

    assert!(close(health_of(&attacker), 90.0));
}

#[test]
fn parried_hit_leaves_the_victim_gate_open() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let defender = arena.join(2);
    arena.give_equipped(&attacker, "iron_sword");
    arena.give_equipped(&defender, "iron_sword");

    defender.block.begin_block().unwrap();
    arena.advance(80);
    attacker.handler.handle_swing().unwrap();
    let parried = attacker.handler.handle_touch(defender.player).unwrap();
    assert!(parried.cancelled);
    assert!(close(health_of(&defender), 100.0));

    // No damage landed, so the same swing may still connect once the
    // defender drops the block.
    defender.block.end_block();
    arena.advance(100);
    let context = attacker.handler.handle_touch(defender.player).unwrap();
    assert!(context.applied);
    assert!(close(health_of(&defender), 95.0));
}

#[test]
fn plain_block_never_counters() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let defender = arena.join(2);
    arena.give_equipped(&attacker, "iron_sword");

    let def = arena.items.get("iron_sword").unwrap();
    let mut instance = ItemInstance::of(def, 1);
    let mut config = default_block_config(def.item_type, def.subtype);
    config.block.counter_damage = 7.0;
    instance.block = Some(config);
    let slot = defender.inventory.add_item(instance).unwrap();
    defender.inventory.equip(slot).unwrap();

    defender.block.begin_block().unwrap();
    arena.advance(300);
    attacker.handler.handle_swing().unwrap();
    let context = attacker.handler.handle_touch(defender.player).unwrap();

    assert!(context.applied);
    assert!(close(health_of(&defender), 97.5));
    // Counter damage applies on a parry, never on an ordinary block.
    assert!(close(health_of(&attacker), 100.0));
}

#[test]
fn block_outside_window_scales_damage() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let defender = arena.join(2);
    arena.give_equipped(&attacker, "iron_sword");
    arena.give_equipped(&defender, "iron_sword");

    defender.block.begin_block().unwrap();
    arena.advance(300);

    attacker.handler.handle_swing().unwrap();
    let context = attacker.handler.handle_touch(defender.player).unwrap();

    assert!(context.applied);
    assert!(close(context.final_damage, 2.5));
    assert!(close(health_of(&defender), 97.5));
    assert!(close(health_of(&attacker), 100.0));
    // Blocking holds until the defender drops it.
    assert!(defender.block.is_blocking());
}

#[test]
fn blocking_halves_walk_speed() {
    let arena = Arena::new();
    let player = arena.join(1);
    arena.give_equipped(&player, "iron_sword");

    player.block.begin_block().unwrap();
    assert!(close(player.movement.target_speed(), 8.0));
    arena.advance(300);
    assert!(close(player.movement.current_speed(), 8.0));

    player.block.end_block();
    assert!(close(player.movement.target_speed(), 16.0));
}

#[test]
fn bow_block_disable_reaction() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let defender = arena.join(2);
    arena.give_equipped(&attacker, "iron_sword");
    let bow = arena.give_equipped(&defender, "hunting_bow");

    defender.block.begin_block().unwrap();
    arena.advance(300);

    attacker.handler.handle_swing().unwrap();
    attacker.handler.handle_touch(defender.player).unwrap();

    assert!(close(health_of(&defender), 100.0 - 5.0 * 0.85));
    // The bow took durability damage, got disabled, and the block ended.
    let snapshot = defender.inventory.snapshot();
    let item = snapshot.slots[0].as_ref().unwrap();
    assert_eq!(item.durability, 116);
    assert!(defender.inventory.is_disabled(bow.uuid));
    assert!(!defender.block.is_blocking());
    assert_eq!(defender.block.begin_block(), Err(BlockError::ItemDisabled));

    arena.advance(2000);
    assert!(!defender.inventory.is_disabled(bow.uuid));
    defender.block.begin_block().unwrap();
}

#[test]
fn break_reaction_destroys_blocking_item() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let defender = arena.join(2);
    arena.give_equipped(&attacker, "iron_sword");

    let def = arena.items.get("iron_sword").unwrap();
    let mut instance = ItemInstance::of(def, 1);
    let mut config = default_block_config(def.item_type, def.subtype);
    config.block.reaction = BlockReaction::Break;
    instance.block = Some(config);
    let slot = defender.inventory.add_item(instance.clone()).unwrap();
    defender.inventory.equip(slot).unwrap();

    defender.block.begin_block().unwrap();
    arena.advance(300);
    attacker.handler.handle_swing().unwrap();
    attacker.handler.handle_touch(defender.player).unwrap();

    assert!(defender.inventory.snapshot().slots[slot].is_none());
    assert!(defender.inventory.equipped().is_none());
    assert!(!defender.block.is_blocking());
}

#[test]
fn instance_block_override_beats_defaults() {
    let def_catalog = default_catalog();
    let def = def_catalog.iter().find(|d| d.id == "iron_sword").unwrap();
    let mut instance = ItemInstance::of(def, 1);
    let mut config = BlockConfig::base();
    config.enabled = true;
    config.parry_window_ms = 300;
    instance.block = Some(config);

    let resolved = combat_core::resolve_block_config(&instance, def);
    assert_eq!(resolved.parry_window_ms, 300);
}

#[test]
fn combo_damage_empowers_every_fourth_hit() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let victim = arena.join(2);
    arena.give_equipped(&attacker, "runed_sword");

    let mut expected = 100.0;
    for hit in 1..=4 {
        attacker.handler.handle_swing().unwrap();
        let context = attacker.handler.handle_touch(victim.player).unwrap();
        let damage = if hit == 4 { 8.0 * 1.2 } else { 8.0 };
        assert!(close(context.final_damage, damage), "hit {hit}");
        expected -= damage;
        assert!(close(health_of(&victim), expected));
        arena.advance(950);
    }
}

#[test]
fn swiftness_proc_boosts_movement_then_expires() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let victim = arena.join(2);
    arena.give_equipped(&attacker, "stormbrand");

    for _ in 0..3 {
        attacker.handler.handle_swing().unwrap();
        attacker.handler.handle_touch(victim.player).unwrap();
        arena.advance(900);
    }

    // Tier 1 swiftness: every third landed hit grants 1.2x speed for 1.4s.
    assert!(close(attacker.movement.target_speed(), 16.0 * 1.2));
    arena.advance(1400);
    assert!(close(attacker.movement.target_speed(), 16.0));
}

#[test]
fn swiftness_falls_back_to_the_combo_tier() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let victim = arena.join(2);
    // runed_sword has no swiftness tier of its own; its combo tier drives it.
    arena.give_equipped(&attacker, "runed_sword");

    for _ in 0..3 {
        attacker.handler.handle_swing().unwrap();
        attacker.handler.handle_touch(victim.player).unwrap();
        arena.advance(950);
    }

    assert!(close(attacker.movement.target_speed(), 16.0 * 1.2));
    arena.advance(1400);
    assert!(close(attacker.movement.target_speed(), 16.0));
}

#[test]
fn reality_break_speeds_up_the_next_swing() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let victim = arena.join(2);
    arena.give_equipped(&attacker, "duskrender");

    for _ in 0..5 {
        attacker.handler.handle_swing().unwrap();
        attacker.handler.handle_touch(victim.player).unwrap();
        arena.advance(1000);
    }

    // Tier 2: the fifth landed hit makes the next swing 3.6x faster.
    assert_eq!(attacker.handler.handle_swing(), Ok(277));
    arena.advance(277);
    assert_eq!(attacker.handler.handle_swing(), Ok(1000));
}

#[test]
fn lifesteal_heals_the_attacker() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let victim = arena.join(2);
    arena.give_equipped(&attacker, "duskrender");
    attacker.health.lock().damage(50.0);

    attacker.handler.handle_swing().unwrap();
    attacker.handler.handle_touch(victim.player).unwrap();

    assert!(close(health_of(&victim), 80.0));
    assert!(close(health_of(&attacker), 52.0));
}

#[test]
fn unequip_tears_down_combat_wiring() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let victim = arena.join(2);
    arena.give_equipped(&attacker, "runed_sword");

    for _ in 0..3 {
        attacker.handler.handle_swing().unwrap();
        attacker.handler.handle_touch(victim.player).unwrap();
        arena.advance(950);
    }

    // Re-equipping resets the combo counter along with the hooks.
    attacker.inventory.unequip();
    assert_eq!(attacker.handler.handle_swing(), Err(SwingError::NoItemEquipped));
    attacker.inventory.equip(0).unwrap();

    attacker.handler.handle_swing().unwrap();
    let context = attacker.handler.handle_touch(victim.player).unwrap();
    assert!(close(context.final_damage, 8.0));
}

#[test]
fn equip_change_ends_active_block() {
    let arena = Arena::new();
    let player = arena.join(1);
    arena.give_equipped(&player, "iron_sword");
    let runed_slot = {
        let def = arena.items.get("runed_sword").unwrap();
        player.inventory.add_item(ItemInstance::of(def, 1)).unwrap()
    };

    player.block.begin_block().unwrap();
    player.inventory.equip(runed_slot).unwrap();
    assert!(!player.block.is_blocking());
    assert!(!player.combat.is_blocking());
}

#[test]
fn inventory_snapshot_round_trips_through_json() {
    let arena = Arena::new();
    let player = arena.join(1);
    arena.give_equipped(&player, "iron_sword");
    let bow_def = arena.items.get("hunting_bow").unwrap();
    player
        .inventory
        .add_item(ItemInstance::of(bow_def, 1))
        .unwrap();

    let snapshot = player.inventory.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let restored = serde_json::from_str(&json).unwrap();
    assert_eq!(snapshot, restored);

    let other = arena.join(2);
    other.inventory.load(restored).unwrap();
    let (instance, def) = other.inventory.equipped().unwrap();
    assert_eq!(def.id, "iron_sword");
    assert_eq!(instance.id, "iron_sword");
    assert!(other.handler.handle_swing().is_ok());
}

#[test]
fn removed_player_takes_no_damage() {
    let arena = Arena::new();
    let attacker = arena.join(1);
    let victim = arena.join(2);
    arena.give_equipped(&attacker, "iron_sword");

    arena.players.remove_player(victim.player);
    assert_eq!(arena.players.len(), 1);

    attacker.handler.handle_swing().unwrap();
    let context = attacker.handler.handle_touch(victim.player).unwrap();
    assert!(!context.applied);
    assert!(context.cancelled);
    assert!(arena.knockback.impulses.lock().is_empty());
}

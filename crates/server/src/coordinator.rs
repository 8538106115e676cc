//! Damage resolution.
//!
//! Every hit flows through three pipelines: the attacker's offensive
//! modifiers, the victim's defensive modifiers, then the attacker's post-hit
//! modifiers once health has actually been applied. Hits queued from inside
//! a pipeline (counter-attacks, chained strikes) resolve after the current
//! hit, in first-in first-out order.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use combat_core::{DamageContext, HitSink, Pipeline, PlayerId};

use crate::oracle::CharacterOracle;

/// The three pipelines owned by one player.
#[derive(Clone)]
pub struct PlayerPipelines {
    pub attacker: Pipeline<DamageContext>,
    pub defender: Pipeline<DamageContext>,
    pub post_hit: Pipeline<DamageContext>,
}

impl PlayerPipelines {
    fn new() -> Self {
        Self {
            attacker: Pipeline::new(),
            defender: Pipeline::new(),
            post_hit: Pipeline::new(),
        }
    }
}

/// Authoritative damage entry point, shared by every player.
#[derive(Clone)]
pub struct ServerDamageCoordinator {
    pipelines: Arc<Mutex<HashMap<PlayerId, PlayerPipelines>>>,
    characters: Arc<dyn CharacterOracle>,
}

impl ServerDamageCoordinator {
    pub fn new(characters: Arc<dyn CharacterOracle>) -> Self {
        Self {
            pipelines: Arc::new(Mutex::new(HashMap::new())),
            characters,
        }
    }

    /// Pipelines for `player`, created on first use.
    pub fn pipelines(&self, player: PlayerId) -> PlayerPipelines {
        self.pipelines
            .lock()
            .entry(player)
            .or_insert_with(PlayerPipelines::new)
            .clone()
    }

    pub fn remove_player(&self, player: PlayerId) {
        self.pipelines.lock().remove(&player);
    }

    /// Resolves a hit and everything it chains into.
    ///
    /// Returns the originating hit's context so callers can tell whether it
    /// was cancelled or applied. Chained hits resolve before this returns.
    pub fn apply(&self, attacker: PlayerId, victim: PlayerId, base_damage: f64) -> DamageContext {
        let queue: Arc<Mutex<VecDeque<DamageContext>>> = Arc::new(Mutex::new(VecDeque::new()));
        queue
            .lock()
            .push_back(DamageContext::new(attacker, victim, base_damage));

        let mut first: Option<DamageContext> = None;
        loop {
            let next = queue.lock().pop_front();
            let Some(mut context) = next else { break };
            context.queue = Some(HitSink::new(Arc::clone(&queue)));

            self.resolve(&mut context);

            context.queue = None;
            if first.is_none() {
                first = Some(context);
            }
        }

        // The seeded hit is popped before the loop can exit.
        first.unwrap_or_else(|| DamageContext::new(attacker, victim, base_damage))
    }

    fn resolve(&self, context: &mut DamageContext) {
        let attacker = self.pipelines(context.attacker);
        let defender = self.pipelines(context.victim);

        // A cancelled phase ends the hit; the victim's defenses never see a
        // hit the attacker's own modifiers called off.
        attacker.attacker.run(context);
        if context.cancelled {
            tracing::debug!(
                target: "combat::damage",
                attacker = %context.attacker,
                victim = %context.victim,
                "hit cancelled in attacker phase"
            );
            return;
        }

        defender.defender.run(context);
        if context.cancelled {
            tracing::debug!(
                target: "combat::damage",
                attacker = %context.attacker,
                victim = %context.victim,
                "hit cancelled in defender phase"
            );
            return;
        }

        // Modifiers may drive the damage negative; a hit never heals.
        context.final_damage = context.final_damage.max(0.0);

        let Some(health) = self.characters.health(context.victim) else {
            context.cancelled = true;
            tracing::warn!(
                target: "combat::damage",
                victim = %context.victim,
                "hit on unknown character dropped"
            );
            return;
        };
        health.lock().damage(context.final_damage);
        context.applied = true;

        tracing::debug!(
            target: "combat::damage",
            attacker = %context.attacker,
            victim = %context.victim,
            base = context.base_damage,
            dealt = context.final_damage,
            "hit applied"
        );

        attacker.post_hit.run(context);
    }
}

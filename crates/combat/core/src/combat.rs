//! Damage resolution context.
//!
//! A [`DamageContext`] is the mutable record threaded through the attacker,
//! defender, and post-hit pipelines for one hit. The coordinator installs a
//! [`HitSink`] on the context before running the phases; modifiers use it to
//! enqueue independent follow-up hits (parry counters) without recursing.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::pipeline::PipelineContext;

/// Stable server-side player identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlayerId(pub u64);

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

/// Payload for a follow-up hit queued during resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueuedHit {
    pub attacker: PlayerId,
    pub victim: PlayerId,
    pub base_damage: f64,
    /// Defaults to `base_damage` when absent.
    pub final_damage: Option<f64>,
}

/// Shared FIFO the coordinator drains; hits queued mid-resolution land here.
///
/// Queued payloads become fresh contexts with cleared flags, decoupled from
/// the pipeline-scoped context that queued them.
#[derive(Clone)]
pub struct HitSink {
    queue: Arc<Mutex<VecDeque<DamageContext>>>,
}

impl HitSink {
    pub fn new(queue: Arc<Mutex<VecDeque<DamageContext>>>) -> Self {
        Self { queue }
    }

    pub fn push(&self, hit: QueuedHit) {
        self.queue.lock().push_back(DamageContext {
            attacker: hit.attacker,
            victim: hit.victim,
            base_damage: hit.base_damage,
            final_damage: hit.final_damage.unwrap_or(hit.base_damage),
            cancelled: false,
            applied: false,
            queue: None,
        });
    }
}

impl std::fmt::Debug for HitSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HitSink")
            .field("pending", &self.queue.lock().len())
            .finish()
    }
}

/// One hit resolution in flight.
///
/// `final_damage` starts equal to `base_damage` and is only ever changed by
/// registered modifiers. `applied` flips to true exactly once, set by the
/// coordinator after the victim's health was mutated.
#[derive(Clone, Debug)]
pub struct DamageContext {
    pub attacker: PlayerId,
    pub victim: PlayerId,
    pub base_damage: f64,
    pub final_damage: f64,
    pub cancelled: bool,
    pub applied: bool,
    /// Present only while the coordinator is resolving this context.
    pub queue: Option<HitSink>,
}

impl DamageContext {
    pub fn new(attacker: PlayerId, victim: PlayerId, base_damage: f64) -> Self {
        Self {
            attacker,
            victim,
            base_damage,
            final_damage: base_damage,
            cancelled: false,
            applied: false,
            queue: None,
        }
    }

    /// Enqueues an independent follow-up hit for later resolution.
    ///
    /// No-op outside an active resolution (the coordinator clears the sink
    /// once the context has been processed, so stale contexts cannot enqueue).
    pub fn queue_hit(&self, hit: QueuedHit) {
        if let Some(queue) = &self.queue {
            queue.push(hit);
        }
    }
}

impl PipelineContext for DamageContext {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

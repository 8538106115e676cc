//! Priority-ordered modifier pipeline.
//!
//! A [`Pipeline`] holds an ordered list of modifiers over a mutable context
//! value. `run` invokes every modifier in descending priority order (ties
//! broken by insertion order) and stops the instant the context reports
//! itself cancelled. Registration hands back a [`PipelineDisposer`] that
//! removes the modifier again; disposers are idempotent and hold only a weak
//! reference, so a forgotten disposer never keeps a pipeline alive.
//!
//! Pipelines are shared registries: block state, enchant bindings, and item
//! effects all register into the same three coordinator pipelines, and a
//! modifier may trigger a re-entrant registration change mid-run (a parry
//! breaking the blocking item, for example). `run` therefore iterates a
//! snapshot of the entry list rather than the live one.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Base contract for values threaded through a pipeline run.
pub trait PipelineContext {
    /// A cancelled context short-circuits the remainder of the run.
    fn is_cancelled(&self) -> bool;
}

/// A registered pipeline stage.
///
/// Modifiers mutate the context in place. Stateful modifiers (hit counters,
/// block state checks) take `&mut self`; the pipeline serializes access to
/// each modifier behind its own lock.
pub trait PipelineModifier<T: PipelineContext>: Send {
    fn priority(&self) -> i32;

    fn apply(&mut self, context: &mut T);
}

/// Removes a registered modifier from its pipeline.
///
/// Safe to call any number of times; only the first call has an effect.
/// Dropping a disposer without calling it leaves the modifier registered.
pub struct PipelineDisposer {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl PipelineDisposer {
    pub fn dispose(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl std::fmt::Debug for PipelineDisposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDisposer")
            .field("disposed", &self.dispose.is_none())
            .finish()
    }
}

struct Entry<T: PipelineContext> {
    id: u64,
    priority: i32,
    modifier: Arc<Mutex<dyn PipelineModifier<T>>>,
}

impl<T: PipelineContext> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            priority: self.priority,
            modifier: Arc::clone(&self.modifier),
        }
    }
}

struct Inner<T: PipelineContext> {
    entries: Vec<Entry<T>>,
    next_id: u64,
}

/// Cloneable handle to a shared, priority-ordered modifier list.
pub struct Pipeline<T: PipelineContext> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: PipelineContext> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: PipelineContext + 'static> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PipelineContext + 'static> Pipeline<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Registers a modifier and returns its disposer.
    ///
    /// The entry list is re-sorted by descending priority; entries with equal
    /// priority keep their insertion order (explicit tie-break on the
    /// insertion sequence, so the sort never has to rely on stability).
    pub fn register<M>(&self, modifier: M) -> PipelineDisposer
    where
        M: PipelineModifier<T> + 'static,
    {
        let priority = modifier.priority();
        let modifier: Arc<Mutex<dyn PipelineModifier<T>>> = Arc::new(Mutex::new(modifier));

        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push(Entry {
            id,
            priority,
            modifier,
        });
        inner
            .entries
            .sort_unstable_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        drop(inner);

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        PipelineDisposer {
            dispose: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().entries.retain(|entry| entry.id != id);
                }
            })),
        }
    }

    /// Registers a closure as a modifier with a fixed priority.
    pub fn register_fn<F>(&self, priority: i32, apply: F) -> PipelineDisposer
    where
        F: FnMut(&mut T) + Send + 'static,
    {
        self.register(FnModifier { priority, apply })
    }

    /// Runs all registered modifiers over `context` in priority order.
    ///
    /// Iterates a snapshot of the entry list, so modifiers may register or
    /// dispose entries (on this or another pipeline) without invalidating the
    /// run. Halts as soon as the context is cancelled; modifiers after the
    /// cancelling one are never invoked, and a context that arrives already
    /// cancelled runs nothing.
    pub fn run(&self, context: &mut T) {
        let snapshot: Vec<Entry<T>> = self.inner.lock().entries.clone();
        for entry in snapshot {
            if context.is_cancelled() {
                break;
            }
            entry.modifier.lock().apply(context);
        }
    }

    /// Number of currently registered modifiers.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

struct FnModifier<F> {
    priority: i32,
    apply: F,
}

impl<T, F> PipelineModifier<T> for FnModifier<F>
where
    T: PipelineContext,
    F: FnMut(&mut T) + Send,
{
    fn priority(&self) -> i32 {
        self.priority
    }

    fn apply(&mut self, context: &mut T) {
        (self.apply)(context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TraceContext {
        order: Vec<&'static str>,
        cancelled: bool,
    }

    impl PipelineContext for TraceContext {
        fn is_cancelled(&self) -> bool {
            self.cancelled
        }
    }

    fn record(name: &'static str) -> impl FnMut(&mut TraceContext) + Send {
        move |ctx| ctx.order.push(name)
    }

    #[test]
    fn runs_in_descending_priority_order() {
        let pipeline = Pipeline::new();
        let _low = pipeline.register_fn(10, record("low"));
        let _high = pipeline.register_fn(100, record("high"));
        let _mid = pipeline.register_fn(50, record("mid"));

        let mut ctx = TraceContext::default();
        pipeline.run(&mut ctx);

        assert_eq!(ctx.order, vec!["high", "mid", "low"]);
    }

    #[test]
    fn equal_priorities_keep_insertion_order() {
        let pipeline = Pipeline::new();
        let _a = pipeline.register_fn(50, record("first"));
        let _b = pipeline.register_fn(50, record("second"));
        let _c = pipeline.register_fn(50, record("third"));

        let mut ctx = TraceContext::default();
        pipeline.run(&mut ctx);

        assert_eq!(ctx.order, vec!["first", "second", "third"]);
    }

    #[test]
    fn cancellation_halts_the_run() {
        let pipeline = Pipeline::new();
        let _high = pipeline.register_fn(100, |ctx: &mut TraceContext| {
            ctx.order.push("cancel");
            ctx.cancelled = true;
        });
        let _low = pipeline.register_fn(10, record("unreached"));

        let mut ctx = TraceContext::default();
        pipeline.run(&mut ctx);

        assert_eq!(ctx.order, vec!["cancel"]);
    }

    #[test]
    fn already_cancelled_context_runs_nothing() {
        let pipeline = Pipeline::new();
        let _entry = pipeline.register_fn(50, record("skipped"));

        let mut ctx = TraceContext {
            order: Vec::new(),
            cancelled: true,
        };
        pipeline.run(&mut ctx);
        assert!(ctx.order.is_empty());
    }

    #[test]
    fn disposer_removes_and_is_idempotent() {
        let pipeline = Pipeline::new();
        let mut disposer = pipeline.register_fn(50, record("gone"));
        let _kept = pipeline.register_fn(10, record("kept"));
        assert_eq!(pipeline.len(), 2);

        disposer.dispose();
        disposer.dispose();
        assert_eq!(pipeline.len(), 1);

        let mut ctx = TraceContext::default();
        pipeline.run(&mut ctx);
        assert_eq!(ctx.order, vec!["kept"]);
    }

    #[test]
    fn modifier_may_dispose_entries_mid_run() {
        let pipeline: Pipeline<TraceContext> = Pipeline::new();
        let victim = pipeline.register_fn(10, record("victim"));
        let victim = Arc::new(Mutex::new(victim));
        let victim_for_hook = Arc::clone(&victim);
        let _remover = pipeline.register_fn(100, move |ctx: &mut TraceContext| {
            ctx.order.push("remover");
            victim_for_hook.lock().dispose();
        });

        let mut ctx = TraceContext::default();
        pipeline.run(&mut ctx);

        // The snapshot taken at run start still includes the victim.
        assert_eq!(ctx.order, vec!["remover", "victim"]);
        assert_eq!(pipeline.len(), 1);

        let mut ctx = TraceContext::default();
        pipeline.run(&mut ctx);
        assert_eq!(ctx.order, vec!["remover"]);
    }
}

//! Deferred task execution.
//!
//! Timed combat effects (parry window expiry, swift-strike decay, item
//! re-enable after a disable reaction) are scheduled as one-shot tasks
//! instead of being polled every tick. [`TokioScheduler`] backs production;
//! [`ManualScheduler`] pairs with [`ManualClock`](crate::time::ManualClock)
//! so tests fire deadlines deterministically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

type Task = Box<dyn FnOnce() + Send>;

/// Cancels a scheduled task. Cancelling after the task ran is a no-op.
#[derive(Clone)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub trait Scheduler: Send + Sync {
    /// Runs `task` once after `delay_ms`, unless the handle is cancelled first.
    fn schedule(&self, delay_ms: u64, task: Task) -> TaskHandle;
}

/// Spawns each task onto the tokio runtime behind a sleep.
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay_ms: u64, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let guard = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if !guard.is_cancelled() {
                task();
            }
        });
        handle
    }
}

/// Test scheduler: tasks sit in a deadline-ordered map until [`run_due`] is
/// called with the current clock reading.
///
/// [`run_due`]: ManualScheduler::run_due
pub struct ManualScheduler {
    now_ms: AtomicU64,
    queue: Mutex<BTreeMap<(u64, u64), (TaskHandle, Task)>>,
    seq: AtomicU64,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicU64::new(0),
            queue: Mutex::new(BTreeMap::new()),
            seq: AtomicU64::new(0),
        })
    }

    /// Pops and runs every task whose deadline is at or before `now_ms`.
    pub fn run_due(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
        loop {
            let entry = {
                let mut queue = self.queue.lock();
                let key = match queue.keys().next() {
                    Some(&key) if key.0 <= now_ms => key,
                    _ => break,
                };
                queue.remove(&key)
            };
            if let Some((handle, task)) = entry {
                if !handle.is_cancelled() {
                    task();
                }
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay_ms: u64, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let deadline = self.now_ms.load(Ordering::SeqCst) + delay_ms;
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .insert((deadline, seq), (handle.clone(), task));
        handle
    }
}

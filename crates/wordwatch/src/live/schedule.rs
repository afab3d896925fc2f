//! Time and debounce capabilities for the live detector.
//!
//! The detector never reads the system clock or spawns timers itself. It is
//! handed a [`Clock`] and a [`DebounceScheduler`], so tests can drive time by
//! hand with [`ManualClock`] and [`ManualScheduler`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A deferred piece of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Source of monotonic milliseconds.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// Runs tasks after a delay.
pub trait DebounceScheduler: Send + Sync {
    /// Run `task` once, `delay_ms` from now.
    fn schedule(&self, delay_ms: u64, task: Task);

    /// Drop every task that has not run yet.
    fn cancel_all(&self);
}

/// Milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading `start`.
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Move time forward.
    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

struct Pending {
    due_ms: u64,
    seq: u64,
    task: Task,
}

#[derive(Default)]
struct ManualQueue {
    pending: Vec<Pending>,
    next_seq: u64,
}

/// Scheduler on top of a [`ManualClock`].
///
/// Tasks run only from [`advance`](Self::advance) or
/// [`run_all`](Self::run_all), on the calling thread, in due order.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: ManualClock,
    queue: Arc<Mutex<ManualQueue>>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now_ms", &self.clock.now_ms())
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl ManualScheduler {
    /// Create a scheduler driven by `clock`.
    #[must_use]
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            queue: Arc::default(),
        }
    }

    /// The clock this scheduler moves.
    #[must_use]
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of tasks waiting.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Check whether any task is waiting.
    #[must_use]
    pub fn has_tasks(&self) -> bool {
        self.pending_len() > 0
    }

    /// Move the clock forward, running every task that falls due on the way.
    ///
    /// The clock reads each task's due time while it runs, and tasks
    /// scheduled by running tasks are picked up if they fall due in range.
    pub fn advance(&self, delta_ms: u64) {
        let target = self.clock.now_ms().saturating_add(delta_ms);
        loop {
            let next = {
                let mut queue = self.lock();
                let idx = queue
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due_ms <= target)
                    .min_by_key(|(_, p)| (p.due_ms, p.seq))
                    .map(|(i, _)| i);
                idx.map(|i| queue.pending.swap_remove(i))
            };
            let Some(pending) = next else { break };
            if pending.due_ms > self.clock.now_ms() {
                self.clock.set(pending.due_ms);
            }
            (pending.task)();
        }
        self.clock.set(target);
    }

    /// Run every waiting task now, without moving the clock. Tasks they
    /// schedule stay queued.
    pub fn run_all(&self) {
        let mut snapshot = std::mem::take(&mut self.lock().pending);
        snapshot.sort_by_key(|p| (p.due_ms, p.seq));
        for pending in snapshot {
            (pending.task)();
        }
    }
}

impl DebounceScheduler for ManualScheduler {
    fn schedule(&self, delay_ms: u64, task: Task) {
        let due_ms = self.clock.now_ms().saturating_add(delay_ms);
        let mut queue = self.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.pending.push(Pending { due_ms, seq, task });
    }

    fn cancel_all(&self) {
        self.lock().pending.clear();
    }
}

/// Scheduler backed by tokio timers.
#[derive(Debug)]
pub struct TokioScheduler {
    handle: Handle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Create a scheduler spawning onto the given runtime.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Create a scheduler on the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl DebounceScheduler for TokioScheduler {
    fn schedule(&self, delay_ms: u64, task: Task) {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            task();
        });
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(join);
    }

    fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

//! Deciding which thread runs user callbacks.
//!
//! The session never calls user code while holding its own lock. Instead it
//! posts tasks, in order, to a [`Dispatcher`]:
//!
//! - [`InlineDispatcher`] runs them on whichever session thread (a reader,
//!   the watchdog, or a caller) posted them, right after the lock is
//!   released.
//! - [`ThreadDispatcher`] runs them on one dedicated thread.
//! - [`TokioDispatcher`] runs them on a tokio runtime, one after another.
//!
//! [`CallbackTracker`] counts tasks posted but not yet finished so that
//! `wait_for_idle` can also wait for callbacks to drain.

use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use tracing::error;

/// A unit of callback work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Executes posted callback tasks in posting order.
pub trait Dispatcher: Send + Sync {
    /// Queues `task`. Must not block on the task running.
    fn post(&self, task: Task);

    /// Runs queued tasks on the current thread, if this dispatcher does that.
    ///
    /// Called by the session after every state change, outside its lock.
    fn run_pending(&self) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct InlineQueue {
    tasks: VecDeque<Task>,
    draining: bool,
}

/// Runs callbacks synchronously on session threads.
///
/// Only one thread drains at a time; a thread that posts while another is
/// draining leaves its tasks to that drainer, which keeps posting order.
#[derive(Default)]
pub struct InlineDispatcher {
    queue: Mutex<InlineQueue>,
}

impl InlineDispatcher {
    /// Creates an inline dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Clears the draining flag even if a task unwinds.
struct DrainGuard<'a>(&'a Mutex<InlineQueue>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        lock(self.0).draining = false;
    }
}

impl Dispatcher for InlineDispatcher {
    fn post(&self, task: Task) {
        lock(&self.queue).tasks.push_back(task);
    }

    fn run_pending(&self) {
        {
            let mut queue = lock(&self.queue);
            if queue.draining || queue.tasks.is_empty() {
                return;
            }
            queue.draining = true;
        }
        let guard = DrainGuard(&self.queue);
        loop {
            let task = {
                let mut queue = lock(&self.queue);
                match queue.tasks.pop_front() {
                    Some(task) => task,
                    None => {
                        // Release the flag under the same lock that saw the
                        // queue empty, so no task is stranded.
                        queue.draining = false;
                        std::mem::forget(guard);
                        return;
                    }
                }
            };
            task();
        }
    }
}

/// Runs callbacks on a dedicated thread, like an event loop.
pub struct ThreadDispatcher {
    tx: mpsc::Sender<Task>,
}

impl ThreadDispatcher {
    /// Starts the dispatch thread.
    ///
    /// The thread exits once the dispatcher is dropped and its queue drained.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be created.
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Task>();
        thread::Builder::new().name(name.to_string()).spawn(move || {
            for task in rx {
                task();
            }
        })?;
        Ok(Self { tx })
    }
}

impl Dispatcher for ThreadDispatcher {
    fn post(&self, task: Task) {
        if self.tx.send(task).is_err() {
            error!("Dispatch thread is gone; dropping callback");
        }
    }
}

/// Runs callbacks in order on a tokio runtime.
///
/// Callbacks are synchronous and run on a runtime worker, so they should be
/// as short as any other non-blocking async code.
pub struct TokioDispatcher {
    tx: tokio::sync::mpsc::UnboundedSender<Task>,
}

impl TokioDispatcher {
    /// Spawns the dispatch task on `handle`.
    #[must_use]
    pub fn new(handle: &tokio::runtime::Handle) -> Self {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Task>();
        handle.spawn(async move {
            while let Some(task) = rx.recv().await {
                task();
            }
        });
        Self { tx }
    }
}

impl Dispatcher for TokioDispatcher {
    fn post(&self, task: Task) {
        if self.tx.send(task).is_err() {
            error!("Tokio dispatch task is gone; dropping callback");
        }
    }
}

thread_local! {
    static CALLBACK_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Returns `true` while the current thread is running a dispatched callback.
#[must_use]
pub fn in_callback() -> bool {
    CALLBACK_DEPTH.with(Cell::get) > 0
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        CALLBACK_DEPTH.with(|d| d.set(d.get() + 1));
        Self
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALLBACK_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Counts callbacks that were posted but have not finished.
#[derive(Default)]
pub struct CallbackTracker {
    in_flight: Mutex<usize>,
    drained: Condvar,
}

impl CallbackTracker {
    /// Creates a tracker with nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts `task` to `dispatcher`, counting it until it has run.
    ///
    /// A panicking callback is logged and otherwise contained.
    pub fn post(self: &Arc<Self>, dispatcher: &dyn Dispatcher, task: Task) {
        *lock(&self.in_flight) += 1;
        let tracker = Arc::clone(self);
        dispatcher.post(Box::new(move || {
            {
                let _depth = DepthGuard::enter();
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!("Session callback panicked");
                }
            }
            tracker.finish();
        }));
    }

    fn finish(&self) {
        let mut in_flight = lock(&self.in_flight);
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.drained.notify_all();
        }
    }

    /// Number of callbacks posted but not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *lock(&self.in_flight)
    }

    /// Blocks until no callbacks are in flight.
    ///
    /// Returns `false` if `deadline` passes first.
    pub fn wait_drained(&self, deadline: Option<Instant>) -> bool {
        let mut in_flight = lock(&self.in_flight);
        while *in_flight > 0 {
            in_flight = match deadline {
                None => self.drained.wait(in_flight).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                        return false;
                    };
                    self.drained
                        .wait_timeout(in_flight, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        true
    }
}

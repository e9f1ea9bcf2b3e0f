//! Waiting on an external signal, racing cancellation and a timeout.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::TaskError;
use crate::task::body::{TaskBody, TaskContext};
use crate::task::lifecycle::Task;

/// How a wait target settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Signaled,
    /// The previous owner went away without releasing the target.
    Abandoned,
}

type Waiter = Box<dyn FnOnce(SignalOutcome) + Send>;

/// Something a [`WaitTask`] can wait on.
pub trait WaitTarget: Send + Sync {
    /// Call `notify` once the target settles; immediately, on this thread,
    /// if it already has. Dropping the returned [`Subscription`] before then
    /// discards `notify`.
    fn subscribe(&self, notify: Waiter) -> Subscription;
}

/// Handle to a pending [`WaitTarget::subscribe`] callback. Dropping it
/// detaches the callback.
#[must_use = "dropping a Subscription detaches its callback"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Subscription with nothing to detach (the callback already ran).
    pub fn inert() -> Self {
        Self { detach: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

#[derive(Default)]
struct Slot {
    outcome: Option<SignalOutcome>,
    next_id: u64,
    waiters: BTreeMap<u64, Waiter>,
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Manual-reset signal. The first of [`set`](Signal::set) or
/// [`abandon`](Signal::abandon) wins; later calls are ignored.
#[derive(Default)]
pub struct Signal {
    slot: Arc<Mutex<Slot>>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.settle(SignalOutcome::Signaled);
    }

    /// Mark the signal as abandoned by its owner.
    pub fn abandon(&self) {
        self.settle(SignalOutcome::Abandoned);
    }

    pub fn outcome(&self) -> Option<SignalOutcome> {
        self.lock().outcome
    }

    /// Callbacks still waiting for the signal to settle.
    pub fn pending_waiters(&self) -> usize {
        self.lock().waiters.len()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        lock_slot(&self.slot)
    }

    fn settle(&self, outcome: SignalOutcome) {
        let waiters = {
            let mut slot = self.lock();
            if slot.outcome.is_some() {
                return;
            }
            slot.outcome = Some(outcome);
            std::mem::take(&mut slot.waiters)
        };
        for waiter in waiters.into_values() {
            waiter(outcome);
        }
    }
}

impl WaitTarget for Signal {
    fn subscribe(&self, notify: Waiter) -> Subscription {
        let mut slot = self.lock();
        if let Some(outcome) = slot.outcome {
            drop(slot);
            notify(outcome);
            return Subscription::inert();
        }
        let id = slot.next_id;
        slot.next_id += 1;
        slot.waiters.insert(id, notify);
        let weak = Arc::downgrade(&self.slot);
        Subscription::new(move || {
            if let Some(slot) = weak.upgrade() {
                // Dropped outside the lock.
                let removed = lock_slot(&slot).waiters.remove(&id);
                drop(removed);
            }
        })
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("outcome", &self.outcome())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Fired {
    Target(SignalOutcome),
    Canceled,
}

/// First-to-fire latch shared by the target and cancellation callbacks.
#[derive(Default)]
struct Race {
    winner: Mutex<Option<Fired>>,
    fired: Condvar,
}

impl Race {
    fn settle(&self, fired: Fired) {
        let mut winner = self.winner.lock().unwrap_or_else(PoisonError::into_inner);
        if winner.is_none() {
            *winner = Some(fired);
            self.fired.notify_all();
        }
    }

    fn wait(&self, timeout: Option<Duration>) -> Option<Fired> {
        // A deadline past what `Instant` can represent is no deadline at all.
        let deadline = timeout.and_then(|limit| Instant::now().checked_add(limit));
        let mut winner = self.winner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(fired) = *winner {
                return Some(fired);
            }
            winner = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.fired
                        .wait_timeout(winner, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .fired
                    .wait(winner)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

/// Body of a [`WaitTask`].
pub struct WaitForSignal {
    target: Arc<dyn WaitTarget>,
    timeout: Option<Duration>,
}

impl WaitForSignal {
    pub fn new(target: Arc<dyn WaitTarget>, timeout: Option<Duration>) -> Self {
        Self { target, timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl TaskBody for WaitForSignal {
    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), TaskError> {
        let race = Arc::new(Race::default());

        // Subscribed first: a target that has already fired beats a token
        // that has already been canceled.
        let on_target = Arc::clone(&race);
        let _subscription = self
            .target
            .subscribe(Box::new(move |outcome| on_target.settle(Fired::Target(outcome))));
        let on_cancel = Arc::clone(&race);
        let _registration = ctx
            .token()
            .register(move || on_cancel.settle(Fired::Canceled));

        debug!(timeout = ?self.timeout, "waiting for signal");
        match race.wait(self.timeout) {
            Some(Fired::Target(SignalOutcome::Signaled)) => Ok(()),
            Some(Fired::Target(SignalOutcome::Abandoned)) => {
                warn!(
                    task = ctx.name(),
                    "wait target was abandoned by its owner, treating as signaled"
                );
                Ok(())
            }
            Some(Fired::Canceled) => Err(TaskError::Canceled),
            None => Err(TaskError::Timeout(self.timeout.unwrap_or_default())),
        }
    }
}

/// Task that completes when its target fires, unless cancellation or the
/// timeout gets there first.
pub type WaitTask = Task<WaitForSignal>;

impl Task<WaitForSignal> {
    pub fn waiting_on(
        name: impl Into<String>,
        target: Arc<dyn WaitTarget>,
        timeout: Option<Duration>,
    ) -> Self {
        Task::new(name, WaitForSignal::new(target, timeout))
    }
}

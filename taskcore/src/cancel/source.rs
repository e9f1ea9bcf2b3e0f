//! One-shot cancellation source and its read-only token.

use std::collections::BTreeMap;
use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::cancel::guard::CancellationGuard;
use crate::cancel::link::CancelLink;
use crate::error::TaskError;

type Observer = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct State {
    requested: bool,
    disposed: bool,
    next_id: u64,
    /// Ids are handed out in increasing order, so iteration order is
    /// registration order.
    observers: BTreeMap<u64, Observer>,
    /// Active guards and their optional release timeout.
    guards: BTreeMap<u64, Option<Duration>>,
}

impl State {
    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Cancellation state owned by a [`CancellationSource`].
///
/// Tokens, registrations and guards only ever hold a [`Weak`] reference to
/// this, so there is no ownership cycle between a source and its observers.
pub(crate) struct Shared {
    requested: Arc<AtomicBool>,
    state: Mutex<State>,
    canceled: Condvar,
    guard_released: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel(&self) {
        let observers = {
            let mut state = self.lock();
            if state.requested {
                trace!("cancellation already requested");
                return;
            }
            state.requested = true;
            self.requested.store(true, Ordering::Release);
            self.canceled.notify_all();
            std::mem::take(&mut state.observers)
        };

        debug!(observers = observers.len(), "cancellation requested");
        for observer in observers.into_values() {
            observer();
        }
        self.wait_for_guards();
    }

    fn wait_for_guards(&self) {
        let started = Instant::now();
        let mut state = self.lock();
        loop {
            let elapsed = started.elapsed();
            let expired: Vec<u64> = state
                .guards
                .iter()
                .filter(|(_, timeout)| timeout.is_some_and(|limit| elapsed >= limit))
                .map(|(id, _)| *id)
                .collect();
            for id in expired {
                state.guards.remove(&id);
                warn!(guard = id, "cancellation guard timed out, proceeding without release");
            }
            if state.guards.is_empty() {
                return;
            }

            let next_expiry = state.guards.values().filter_map(|timeout| *timeout).min();
            debug!(pending = state.guards.len(), "waiting for cancellation guards");
            state = match next_expiry {
                Some(limit) => {
                    self.guard_released
                        .wait_timeout(state, limit.saturating_sub(elapsed))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .guard_released
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Stores `observer` and returns its id, or hands it back when the
    /// source was already canceled so the caller can fire it.
    fn register(&self, observer: Observer) -> Result<u64, Observer> {
        let mut state = self.lock();
        if state.requested {
            return Err(observer);
        }
        let id = state.allocate_id();
        state.observers.insert(id, observer);
        Ok(id)
    }

    fn unregister(&self, id: u64) {
        // Dropped outside the lock: an observer may own another token's guard.
        let removed = self.lock().observers.remove(&id);
        drop(removed);
    }

    pub(crate) fn add_guard(&self, timeout: Option<Duration>) -> Option<u64> {
        let mut state = self.lock();
        if state.requested {
            return None;
        }
        let id = state.allocate_id();
        state.guards.insert(id, timeout);
        Some(id)
    }

    pub(crate) fn release_guard(&self, id: u64) {
        let mut state = self.lock();
        if state.guards.remove(&id).is_some() {
            self.guard_released.notify_all();
        }
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        // A deadline past what `Instant` can represent is no deadline at all.
        let deadline = timeout.and_then(|limit| Instant::now().checked_add(limit));
        let mut state = self.lock();
        loop {
            if state.requested {
                return true;
            }
            if state.disposed {
                return false;
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.canceled
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .canceled
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn dispose(&self) {
        let observers = {
            let mut state = self.lock();
            state.disposed = true;
            self.canceled.notify_all();
            std::mem::take(&mut state.observers)
        };
        drop(observers);
    }
}

/// Owner of a one-shot cancellation signal.
///
/// Hand out [`CancellationToken`]s to the work that should observe the
/// signal; only the source can trigger it. Dropping the source detaches every
/// observer and wakes threads blocked in [`CancellationToken::wait`].
pub struct CancellationSource {
    shared: Arc<Shared>,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                requested: Arc::new(AtomicBool::new(false)),
                state: Mutex::new(State::default()),
                canceled: Condvar::new(),
                guard_released: Condvar::new(),
            }),
        }
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            requested: Arc::clone(&self.shared.requested),
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn is_requested(&self) -> bool {
        self.shared.requested.load(Ordering::Acquire)
    }

    /// Request cancellation.
    ///
    /// The first call flips the requested flag, wakes waiters and runs every
    /// registered observer on this thread in registration order, then blocks
    /// until all active [`CancellationGuard`]s are released or time out.
    /// Later calls return immediately without re-firing anything.
    pub fn cancel(&self) {
        self.shared.cancel();
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancellationSource {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl std::fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSource")
            .field("requested", &self.is_requested())
            .finish()
    }
}

/// Read-only observer of a [`CancellationSource`].
///
/// Cheap to clone. [`CancellationToken::none`] yields a token that is never
/// signaled. A token must not be relied on after its source is dropped:
/// registrations are then discarded and waits report "not canceled".
#[derive(Clone)]
pub struct CancellationToken {
    requested: Arc<AtomicBool>,
    shared: Weak<Shared>,
}

impl CancellationToken {
    pub fn none() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            shared: Weak::new(),
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Returns [`TaskError::Canceled`] once cancellation has been requested.
    pub fn check(&self) -> Result<(), TaskError> {
        if self.is_requested() {
            Err(TaskError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Block until cancellation is requested or `timeout` elapses.
    ///
    /// Returns `true` if cancellation was requested.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        if self.is_requested() {
            return true;
        }
        match self.shared.upgrade() {
            Some(shared) => shared.wait(timeout),
            None => false,
        }
    }

    /// Resolves once cancellation is requested. Never resolves for a null
    /// token or one whose source was dropped without canceling.
    pub async fn cancelled(&self) {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let _registration = self.register(move || {
            let _ = tx.send(());
        });
        if rx.await.is_err() {
            pending::<()>().await;
        }
    }

    /// Attach `observer` to the source.
    ///
    /// The observer runs on the canceling thread. If cancellation was already
    /// requested it runs right here, before `register` returns.
    pub fn register<F>(&self, observer: F) -> Registration
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(shared) = self.shared.upgrade() else {
            if self.is_requested() {
                observer();
            }
            return Registration::inert();
        };
        match shared.register(Box::new(observer)) {
            Ok(id) => Registration {
                shared: Arc::downgrade(&shared),
                id: Some(id),
            },
            Err(observer) => {
                drop(shared);
                observer();
                Registration::inert()
            }
        }
    }

    /// Forward cancellation over `link`, typically to another process.
    ///
    /// A link whose far end is gone is logged and discarded; it never stops
    /// local cancellation from completing.
    pub fn register_link<L>(&self, link: L) -> Registration
    where
        L: CancelLink + 'static,
    {
        self.register(move || {
            if let Err(err) = link.notify() {
                debug!(%err, "discarding broken cancellation link");
            }
        })
    }

    /// Shorthand for [`CancellationGuard::new`].
    pub fn guard(&self, timeout: Option<Duration>) -> CancellationGuard {
        CancellationGuard::new(self, timeout)
    }

    pub(crate) fn shared(&self) -> &Weak<Shared> {
        &self.shared
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("requested", &self.is_requested())
            .finish()
    }
}

/// Handle to a registered observer. Dropping it detaches the observer.
#[must_use = "dropping a Registration detaches its observer"]
pub struct Registration {
    shared: Weak<Shared>,
    id: Option<u64>,
}

impl Registration {
    fn inert() -> Self {
        Self {
            shared: Weak::new(),
            id: None,
        }
    }

    pub fn detach(self) {}

    /// Leave the observer attached for the rest of the source's life.
    pub fn keep(mut self) {
        self.id = None;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(shared) = self.shared.upgrade() {
            shared.unregister(id);
        }
    }
}

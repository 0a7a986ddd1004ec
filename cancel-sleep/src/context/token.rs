//! Hierarchical cancellation context.

use super::ContextOptions;
use crate::cancellation::{invoke, ObserverList, Registration};
use crate::errors::{CancelReason, Error};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle of a context. `Canceled` is terminal.
enum State {
    Active(ObserverList),
    Canceled(CancelReason),
}

/// Non-owning link from a child to its parent.
struct ParentLink {
    parent: Weak<Inner>,
    registration: Registration,
}

struct Inner {
    id: Uuid,
    state: Mutex<State>,
    done: watch::Sender<bool>,
    deadline: Option<Instant>,
    parent: Mutex<Option<ParentLink>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Transitions to `Canceled`. Returns false if already canceled.
    fn cancel_with(&self, reason: CancelReason) -> bool {
        let observers = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Canceled(_) => return false,
                State::Active(observers) => {
                    let observers = std::mem::take(observers);
                    *state = State::Canceled(reason);
                    observers
                }
            }
        };

        self.release();
        self.done.send_replace(true);
        debug!(context_id = %self.id, %reason, "context canceled");

        observers.notify(reason);
        true
    }

    fn remove_observer(&self, registration: Registration) -> bool {
        match &mut *self.state.lock() {
            State::Active(observers) => observers.remove(registration),
            State::Canceled(_) => false,
        }
    }

    /// Stops the timeout task and unsubscribes from the parent.
    fn release(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        let link = self.parent.lock().take();
        if let Some(link) = link {
            if let Some(parent) = link.parent.upgrade() {
                parent.remove_observer(link.registration);
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.release();
    }
}

/// A node in a tree of cancellation tokens.
///
/// A context becomes done when its timeout elapses, when [`Context::cancel`]
/// is called, or when its parent becomes done. Once done it stays done and
/// keeps the first reason. Clones share the same state.
///
/// Children hold only a weak link to their parent, so dropping a parent's
/// last handle tears it down even while children are alive.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// Creates a context from options.
    ///
    /// # Panics
    ///
    /// Panics if the context gets a deadline, its own or its parent's,
    /// outside a tokio runtime.
    pub fn new(options: ContextOptions) -> Self {
        let timeout = options.timeout();
        let ContextOptions { timeout_ms, parent } = options;

        let own_deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let parent_deadline = parent.as_ref().and_then(Self::deadline);
        let deadline = match (own_deadline, parent_deadline) {
            (Some(own), Some(inherited)) => Some(own.min(inherited)),
            (own, inherited) => own.or(inherited),
        };

        let (done, _) = watch::channel(false);
        let context = Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                state: Mutex::new(State::Active(ObserverList::new())),
                done,
                deadline,
                parent: Mutex::new(None),
                timer: Mutex::new(None),
            }),
        };
        debug!(
            context_id = %context.inner.id,
            timeout_ms,
            has_parent = parent.is_some(),
            "context created"
        );

        if let Some(parent) = parent {
            context.link_parent(&parent);
        }
        // An inherited deadline gets its own timer: the parent link is weak,
        // and the parent's timer goes away with the parent.
        if timeout.is_some_and(|t| t.is_zero()) {
            context.inner.cancel_with(CancelReason::DeadlineExceeded);
        } else if let Some(at) = deadline {
            context.arm_timer(at);
        }
        context
    }

    /// Creates a context with no timeout and no parent.
    #[must_use]
    pub fn background() -> Self {
        Self::new(ContextOptions::new())
    }

    /// Creates a child of this context.
    #[must_use]
    pub fn child(&self, options: ContextOptions) -> Self {
        Self::new(options.with_parent(self))
    }

    fn link_parent(&self, parent: &Self) {
        let child = Arc::downgrade(&self.inner);
        let registration = parent.on_done(move |reason| {
            if let Some(inner) = child.upgrade() {
                inner.cancel_with(reason);
            }
        });
        if !registration.fired_immediately() {
            *self.inner.parent.lock() = Some(ParentLink {
                parent: Arc::downgrade(&parent.inner),
                registration,
            });
        }
    }

    fn arm_timer(&self, deadline: Instant) {
        if self.is_done() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                // Finishing on our own; nothing left to abort.
                drop(inner.timer.lock().take());
                debug!(context_id = %inner.id, "context timeout elapsed");
                inner.cancel_with(CancelReason::DeadlineExceeded);
            }
        });
        *self.inner.timer.lock() = Some(handle);
    }

    /// Cancels the context and every descendant.
    ///
    /// Idempotent: only the first cancellation takes effect.
    pub fn cancel(&self) {
        self.inner.cancel_with(CancelReason::Canceled);
    }

    /// Registers an observer for the done transition.
    ///
    /// Observers run in registration order, outside any lock. If the context
    /// is already done the observer runs immediately and the returned
    /// registration reports [`Registration::fired_immediately`].
    pub fn on_done<F>(&self, observer: F) -> Registration
    where
        F: FnOnce(CancelReason) + Send + 'static,
    {
        let reason = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Active(observers) => return observers.push(Box::new(observer)),
                State::Canceled(reason) => *reason,
            }
        };
        invoke(Registration::FIRED, Box::new(observer), reason);
        Registration::FIRED
    }

    /// Removes an observer that has not fired yet.
    ///
    /// Returns true if the observer was removed.
    pub fn off(&self, registration: Registration) -> bool {
        self.inner.remove_observer(registration)
    }

    /// Waits until the context is done.
    pub async fn done(&self) {
        let mut done = self.inner.done.subscribe();
        // The sender lives in `self`, so this cannot fail.
        done.wait_for(|done| *done).await.ok();
    }

    /// Returns true once the context is canceled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.reason().is_some()
    }

    /// Returns the cancellation reason, if canceled.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        match &*self.inner.state.lock() {
            State::Active(_) => None,
            State::Canceled(reason) => Some(*reason),
        }
    }

    /// Returns the cancellation error, if canceled.
    #[must_use]
    pub fn err(&self) -> Option<Error> {
        self.reason().map(Error::Canceled)
    }

    /// Returns the earliest deadline of this context and its ancestors.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Returns the time left until the deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the context id used in log output.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self) -> usize {
        match &*self.inner.state.lock() {
            State::Active(observers) => observers.len(),
            State::Canceled(_) => 0,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("reason", &self.reason())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CallRecorder;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_background_not_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert!(ctx.reason().is_none());
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancel() {
        let ctx = Context::background();
        ctx.cancel();

        assert!(ctx.is_done());
        assert_eq!(ctx.reason(), Some(CancelReason::Canceled));
        assert_eq!(ctx.err(), Some(Error::Canceled(CancelReason::Canceled)));
    }

    #[test]
    fn test_cancel_idempotent() {
        let ctx = Context::background();
        let calls = CallRecorder::new();
        ctx.on_done(calls.observer("done"));

        ctx.cancel();
        ctx.cancel();

        assert_eq!(calls.count(), 1);
    }

    #[test]
    fn test_on_done_after_cancel_runs_immediately() {
        let ctx = Context::background();
        ctx.cancel();

        let calls = CallRecorder::new();
        let registration = ctx.on_done(calls.observer("late"));

        assert!(registration.fired_immediately());
        assert_eq!(calls.count(), 1);
        assert!(!ctx.off(registration));
    }

    #[test]
    fn test_off_prevents_notification() {
        let ctx = Context::background();
        let calls = CallRecorder::new();
        let registration = ctx.on_done(calls.observer("removed"));
        ctx.on_done(calls.observer("kept"));

        assert!(ctx.off(registration));
        ctx.cancel();

        assert_eq!(calls.calls(), vec!["kept".to_string()]);
    }

    #[test]
    fn test_zero_timeout_is_done_immediately() {
        let ctx = Context::new(ContextOptions::new().with_timeout_ms(0));
        assert_eq!(ctx.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_with_deadline_exceeded() {
        let start = Instant::now();
        let ctx = Context::new(ContextOptions::new().with_timeout_ms(1500));
        let calls = CallRecorder::new();
        ctx.on_done(calls.observer("done"));

        assert_eq!(ctx.remaining(), Some(Duration::from_millis(1500)));

        ctx.done().await;

        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert_eq!(ctx.reason(), Some(CancelReason::DeadlineExceeded));
        assert_eq!(calls.count(), 1);
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_cancel_stops_timeout() {
        let ctx = Context::new(ContextOptions::new().with_timeout_ms(100));
        ctx.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ctx.reason(), Some(CancelReason::Canceled));
    }

    #[test]
    fn test_parent_cancel_propagates_to_descendants() {
        let parent = Context::background();
        let child = parent.child(ContextOptions::new());
        let grandchild = child.child(ContextOptions::new());

        parent.cancel();

        assert_eq!(child.reason(), Some(CancelReason::Canceled));
        assert_eq!(grandchild.reason(), Some(CancelReason::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_adopts_parent_deadline_reason() {
        let parent = Context::new(ContextOptions::new().with_timeout_ms(200));
        let child = parent.child(ContextOptions::new());

        assert_eq!(child.deadline(), parent.deadline());

        child.done().await;
        assert_eq!(child.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_inherited_deadline_after_parent_dropped() {
        let start = Instant::now();
        let child = Context::new(ContextOptions::new().with_timeout_ms(200))
            .child(ContextOptions::new());
        assert_eq!(child.remaining(), Some(Duration::from_millis(200)));

        let result = crate::sleep::sleep(3000).set_context(&child).unwrap().await;

        assert_eq!(result, Err(Error::Canceled(CancelReason::DeadlineExceeded)));
        assert!(start.elapsed() < Duration::from_millis(300));
        assert_eq!(child.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn test_child_cancel_leaves_parent_active() {
        let parent = Context::background();
        let child = parent.child(ContextOptions::new());

        child.cancel();

        assert!(child.is_done());
        assert!(!parent.is_done());
        assert_eq!(parent.observer_count(), 0);
    }

    #[test]
    fn test_child_of_done_parent_is_born_done() {
        let parent = Context::background();
        parent.cancel();

        let child = parent.child(ContextOptions::new());
        assert_eq!(child.reason(), Some(CancelReason::Canceled));
    }

    #[test]
    fn test_dropped_child_unsubscribes_from_parent() {
        let parent = Context::background();
        let child = parent.child(ContextOptions::new());
        assert_eq!(parent.observer_count(), 1);

        drop(child);
        assert_eq!(parent.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_is_earliest() {
        let parent = Context::new(ContextOptions::new().with_timeout_ms(1000));
        let child = parent.child(ContextOptions::new().with_timeout_ms(5000));
        assert_eq!(child.deadline(), parent.deadline());

        let short = parent.child(ContextOptions::new().with_timeout_ms(10));
        assert!(short.deadline() < parent.deadline());
    }
}

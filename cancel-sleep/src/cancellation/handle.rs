//! Detached handles onto a [`Cancelable`](super::Cancelable).

use super::cancelable::Shared;
use crate::errors::{CancelReason, Error};
use std::sync::{Arc, Weak};

/// Type-erased view of an awaitable's settlement latch.
trait CancelTarget: Send + Sync {
    fn cancel(&self, reason: CancelReason) -> bool;
    fn is_settled(&self) -> bool;
}

impl<T: Send + 'static> CancelTarget for Shared<T> {
    fn cancel(&self, reason: CancelReason) -> bool {
        Self::cancel(self, reason)
    }

    fn is_settled(&self) -> bool {
        Self::is_settled(self)
    }
}

/// Cancels an awaitable from elsewhere, for instance while it is awaited.
///
/// Holds a weak reference; once the awaitable is gone the handle does
/// nothing.
#[derive(Clone)]
pub struct CancelHandle {
    target: Weak<dyn CancelTarget>,
}

impl CancelHandle {
    pub(super) fn new<T: Send + 'static>(shared: &Arc<Shared<T>>) -> Self {
        let target = Arc::downgrade(shared);
        let target: Weak<dyn CancelTarget> = target;
        Self { target }
    }

    /// Cancels the awaitable.
    ///
    /// Returns true if this call settled it.
    pub fn cancel(&self) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| target.cancel(CancelReason::Canceled))
    }

    /// Returns true if the awaitable settled or no longer exists.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.target.upgrade().map_or(true, |target| target.is_settled())
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Settles an executor-style awaitable.
///
/// Clones share the same latch; only the first settlement counts.
pub struct Resolver<T> {
    shared: Weak<Shared<T>>,
}

impl<T: Send + 'static> Resolver<T> {
    pub(super) fn new(shared: &Arc<Shared<T>>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
        }
    }

    /// Resolves with `value`. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.resolve(Ok(value)))
    }

    /// Settles with `error` without running cancellation observers.
    pub fn reject(&self, error: Error) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.resolve(Err(error)))
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::Cancelable;

    #[test]
    fn test_handle_outlives_awaitable() {
        let cancelable = Cancelable::<()>::new(|_| {});
        let handle = cancelable.handle();
        assert!(!handle.is_settled());

        assert!(cancelable.cancel());
        drop(cancelable);

        assert!(handle.is_settled());
        assert!(!handle.cancel());
    }

    #[test]
    fn test_resolver_after_drop_is_noop() {
        let mut slot = None;
        let cancelable = Cancelable::new(|resolver| slot = Some(resolver));
        drop(cancelable);

        assert!(!slot.unwrap().resolve(1));
    }

    #[test]
    fn test_cloned_resolvers_share_latch() {
        let mut slot = None;
        let _cancelable = Cancelable::new(|resolver| slot = Some(resolver));
        let first = slot.unwrap();
        let second = first.clone();

        assert!(first.resolve("a"));
        assert!(!second.resolve("b"));
    }
}

//! Ordered, removable cancellation observers.

use crate::errors::CancelReason;
use tracing::{trace, warn};

/// A callback invoked once with the cancellation reason.
pub type CancelObserver = Box<dyn FnOnce(CancelReason) + Send>;

/// Handle returned when an observer is registered.
///
/// Pass it back to the owner to remove the observer before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registration(u64);

impl Registration {
    /// Registration handed out when the observer already ran.
    pub(crate) const FIRED: Self = Self(0);

    /// Returns true if the observer ran during registration.
    #[must_use]
    pub const fn fired_immediately(self) -> bool {
        self.0 == Self::FIRED.0
    }
}

/// Observers kept in registration order.
///
/// Not synchronized on its own; owners keep it behind their state lock and
/// take it out before notifying.
#[derive(Default)]
pub(crate) struct ObserverList {
    next_id: u64,
    entries: Vec<(Registration, CancelObserver)>,
}

impl ObserverList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, observer: CancelObserver) -> Registration {
        self.next_id += 1;
        let registration = Registration(self.next_id);
        self.entries.push((registration, observer));
        trace!(id = registration.0, "observer registered");
        registration
    }

    /// Removes an observer that has not fired yet.
    pub(crate) fn remove(&mut self, registration: Registration) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(id, _)| *id != registration);
        let removed = self.entries.len() < before;
        if removed {
            trace!(id = registration.0, "observer removed");
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Invokes every observer in registration order.
    ///
    /// A panicking observer is logged and skipped; the rest still run.
    pub(crate) fn notify(self, reason: CancelReason) {
        for (registration, observer) in self.entries {
            invoke(registration, observer, reason);
        }
    }
}

/// Runs a single observer, isolating panics.
pub(crate) fn invoke(registration: Registration, observer: CancelObserver, reason: CancelReason) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        observer(reason);
    })) {
        warn!(id = registration.0, "Cancellation observer panicked: {:?}", panic);
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("pending_count", &self.len())
            .finish()
    }
}

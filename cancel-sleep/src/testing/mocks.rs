//! Recording callbacks for tests.

use crate::errors::CancelReason;
use parking_lot::Mutex;
use std::sync::Arc;

/// Records labelled calls from observers and other callbacks.
///
/// Clones share the same record, so one clone can be moved into a callback
/// while the test keeps another.
#[derive(Debug, Clone, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<String>>>,
    reasons: Arc<Mutex<Vec<CancelReason>>>,
}

impl CallRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call.
    pub fn record(&self, label: impl Into<String>) {
        self.calls.lock().push(label.into());
    }

    /// Returns a cancellation observer that records `label` and the reason.
    pub fn observer(&self, label: impl Into<String>) -> impl FnOnce(CancelReason) + Send + 'static {
        let recorder = self.clone();
        let label = label.into();
        move |reason| {
            recorder.reasons.lock().push(reason);
            recorder.record(label);
        }
    }

    /// Returns the number of recorded calls.
    #[must_use]
    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the number of calls recorded under `label`.
    #[must_use]
    pub fn count_of(&self, label: &str) -> usize {
        self.calls.lock().iter().filter(|call| *call == label).count()
    }

    /// Returns the recorded labels in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns the reasons passed to observers, in call order.
    #[must_use]
    pub fn reasons(&self) -> Vec<CancelReason> {
        self.reasons.lock().clone()
    }

    /// Clears everything recorded so far.
    pub fn reset(&self) {
        self.calls.lock().clear();
        self.reasons.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_counts_by_label() {
        let recorder = CallRecorder::new();
        recorder.record("a");
        recorder.record("b");
        recorder.record("a");

        assert_eq!(recorder.count(), 3);
        assert_eq!(recorder.count_of("a"), 2);
        assert_eq!(recorder.calls(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_observer_records_reason() {
        let recorder = CallRecorder::new();
        let observer = recorder.observer("cancel");
        observer(CancelReason::DeadlineExceeded);

        assert_eq!(recorder.count_of("cancel"), 1);
        assert_eq!(recorder.reasons(), vec![CancelReason::DeadlineExceeded]);

        recorder.reset();
        assert_eq!(recorder.count(), 0);
    }
}

//! Cancelable sleep.

use crate::cancellation::{Cancelable, CancelableOptions};
use std::time::Duration;
use tracing::{debug, trace};

/// Sleeps for `duration_ms` milliseconds unless canceled first.
///
/// Zero and negative durations fire as soon as possible. The returned
/// awaitable resolves `Ok(())` when the timer fires, or settles with
/// [`Error::Canceled`](crate::Error::Canceled) if an attached context, a
/// cancel call, or a drop gets there first. The timer is cleared on
/// cancellation and never fires afterwards.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let ctx = Context::new(ContextOptions::new().with_timeout_ms(1500));
/// let result = sleep(2000).set_context(&ctx)?.await;
/// assert!(result.unwrap_err().is_canceled());
/// ```
pub fn sleep(duration_ms: i64) -> Cancelable<()> {
    sleep_for(Duration::from_millis(u64::try_from(duration_ms).unwrap_or(0)))
}

/// Sleeps for `duration` unless canceled first.
///
/// The deadline is fixed when this is called, not when first polled.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
pub fn sleep_for(duration: Duration) -> Cancelable<()> {
    let timer = tokio::time::sleep(duration);
    let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    debug!(duration_ms, "sleep scheduled");

    Cancelable::from_future_with_options(
        async move {
            timer.await;
            trace!(duration_ms, "sleep timer fired");
            Ok(())
        },
        CancelableOptions::new().with_cancel_handler(move |err| {
            debug!(duration_ms, error = %err, "sleep canceled, timer cleared");
            err
        }),
    )
}

//! Test assertions for awaitable outcomes.

use crate::errors::{CancelReason, Result};
use std::fmt::Debug;

/// Asserts that the outcome is a success and returns the value.
pub fn assert_resolved<T: Debug>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("Expected resolution, got error: {err}"),
    }
}

/// Asserts that the outcome is a cancellation with the given reason.
pub fn assert_canceled<T: Debug>(result: &Result<T>, expected: CancelReason) {
    match result {
        Err(err) => assert_eq!(
            err.cancel_reason(),
            Some(expected),
            "Expected cancellation with {expected:?}, got {err}"
        ),
        Ok(value) => panic!("Expected cancellation with {expected:?}, got value: {value:?}"),
    }
}

/// Asserts that the outcome is a context-driven cancellation.
///
/// The error message must mention the context so callers can tell it apart
/// from other failures.
pub fn assert_context_canceled<T: Debug>(result: &Result<T>) {
    match result {
        Err(err) => {
            assert!(
                err.cancel_reason().is_some_and(CancelReason::is_context),
                "Expected context cancellation, got {err}"
            );
            assert!(
                err.to_string().to_lowercase().contains("context"),
                "Expected error to mention the context, got {err}"
            );
        }
        Ok(value) => panic!("Expected context cancellation, got value: {value:?}"),
    }
}

//! Testing utilities for cancel-sleep.
//!
//! This module provides:
//! - A call recorder standing in for mocked callbacks
//! - Assertions for canceled and resolved outcomes
//! - One-time tracing setup for tests

mod assertions;
mod logging;
mod mocks;

pub use assertions::{assert_canceled, assert_context_canceled, assert_resolved};
pub use logging::init_test_logging;
pub use mocks::CallRecorder;

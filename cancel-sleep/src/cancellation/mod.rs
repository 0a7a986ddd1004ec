//! Cancelable awaitables.
//!
//! This module provides:
//! - Cancelable, a settle-once future with cancel handlers and observers
//! - Resolver and CancelHandle for settling it from elsewhere
//! - Registration, the handle for removing an observer

mod cancelable;
mod handle;
mod observers;

pub use cancelable::{CancelHandler, Cancelable, CancelableOptions};
pub use handle::{CancelHandle, Resolver};
pub(crate) use observers::{invoke, ObserverList};
pub use observers::{CancelObserver, Registration};

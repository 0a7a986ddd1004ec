//! # cancel-sleep
//!
//! A cancelable delay that composes with hierarchical cancellation contexts.
//!
//! The crate provides:
//!
//! - **Cancelable sleep**: [`sleep`] resolves after a delay unless canceled first
//! - **Cancelable awaitables**: settle-once futures with cancel handlers and observers
//! - **Cancellation contexts**: parent/child token trees with timeouts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cancel_sleep::prelude::*;
//!
//! let parent = Context::background();
//! let ctx = parent.child(ContextOptions::new().with_timeout_ms(1500));
//!
//! // Resolves: 500ms is inside the context's lifetime.
//! sleep(500).set_context(&ctx)?.await?;
//!
//! // Canceled at 1500ms with "context deadline exceeded".
//! let err = sleep(2000).set_context(&ctx)?.await.unwrap_err();
//! assert!(err.is_canceled());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod errors;
pub mod sleep;
#[cfg(any(test, feature = "testing"))]
pub mod testing;


pub use cancellation::{CancelHandle, Cancelable, CancelableOptions, Resolver};
pub use context::{Context, ContextOptions, Registration};
pub use errors::{CancelReason, Error, Result};
pub use sleep::{sleep, sleep_for};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{
        CancelHandle, CancelHandler, Cancelable, CancelableOptions, Resolver,
    };
    pub use crate::context::{Context, ContextOptions, Registration};
    pub use crate::errors::{CancelReason, Error};
    pub use crate::sleep::{sleep, sleep_for};
}

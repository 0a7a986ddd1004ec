//! Hierarchical cancellation contexts.
//!
//! This module provides:
//! - Context, a tree of cancellation tokens with optional deadlines
//! - ContextOptions, the builder and config form of a context's settings

mod options;
mod token;

pub use crate::cancellation::Registration;
pub use options::ContextOptions;
pub use token::Context;

//! Configuration for cancellation contexts.

use super::Context;
use serde::Deserialize;
use std::time::Duration;

/// Options used to build a [`Context`].
///
/// Deserializable so timeouts can come from configuration files; `Timeout`
/// is accepted as an alias for `timeout_ms`. The parent never comes from
/// configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Milliseconds until the context cancels itself.
    #[serde(alias = "Timeout", alias = "timeout")]
    pub timeout_ms: Option<u64>,
    /// Parent context; its cancellation propagates to the child.
    #[serde(skip)]
    pub parent: Option<Context>,
}

impl ContextOptions {
    /// Creates empty options: no timeout, no parent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the timeout in milliseconds.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets the parent context.
    #[must_use]
    pub fn with_parent(mut self, parent: &Context) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Returns the timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ContextOptions::new();
        assert!(options.timeout().is_none());
        assert!(options.parent.is_none());
    }

    #[test]
    fn test_with_timeout() {
        let options = ContextOptions::new().with_timeout(Duration::from_millis(1500));
        assert_eq!(options.timeout_ms, Some(1500));
        assert_eq!(options.timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_deserialize_timeout_alias() {
        let options: ContextOptions = serde_json::from_str(r#"{ "Timeout": 1500 }"#).unwrap();
        assert_eq!(options.timeout_ms, Some(1500));

        let options: ContextOptions = serde_json::from_str(r#"{ "timeout_ms": 250 }"#).unwrap();
        assert_eq!(options.timeout_ms, Some(250));
    }

    #[test]
    fn test_deserialize_empty() {
        let options: ContextOptions = serde_json::from_str("{}").unwrap();
        assert!(options.timeout_ms.is_none());
        assert!(options.parent.is_none());
    }
}

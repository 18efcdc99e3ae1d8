//! Log events.
//!
//! An [`Event`] is a plain-text pattern that is observed when a single log line
//! contains it. There is no regex or escaping: matching is case-sensitive
//! substring containment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Banner the node prints once its RPC server accepts requests.
pub const RPC_SERVER_STARTED: &str = "rpc-server - (UNDERTOW) started";

/// An immutable pattern matched against individual log lines.
///
/// Two events are equal iff their patterns are equal.
///
/// # Examples
///
/// ```
/// use nodeharness::Event;
///
/// let event = Event::new("block sealed").unwrap();
/// assert!(event.is_observed_in("INFO  [main] block sealed #12"));
/// assert!(!event.is_observed_in("INFO  [main] Block Sealed #12"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Event {
    pattern: String,
}

impl Event {
    /// Creates an event for the given pattern.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyPattern` if `pattern` is empty, since an
    /// empty pattern would be observed in every line.
    pub fn new(pattern: impl Into<String>) -> Result<Self, ValidationError> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(ValidationError::EmptyPattern);
        }
        Ok(Self { pattern })
    }

    /// The readiness event for a node's RPC server.
    #[must_use]
    pub fn rpc_server_started() -> Self {
        Self {
            pattern: RPC_SERVER_STARTED.to_string(),
        }
    }

    /// The raw pattern text.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns true if `line` contains this event's pattern.
    #[must_use]
    pub fn is_observed_in(&self, line: &str) -> bool {
        line.contains(self.pattern.as_str())
    }
}

impl TryFrom<String> for Event {
    type Error = ValidationError;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        Self::new(pattern)
    }
}

impl From<Event> for String {
    fn from(event: Event) -> Self {
        event.pattern
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({:?})", self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(matches!(Event::new(""), Err(ValidationError::EmptyPattern)));
    }

    #[test]
    fn matching_is_case_sensitive_substring() {
        let event = Event::new("UNDERTOW").unwrap();
        assert!(event.is_observed_in("rpc-server - (UNDERTOW) started"));
        assert!(!event.is_observed_in("rpc-server - (undertow) started"));
        assert!(!event.is_observed_in(""));
    }

    #[test]
    fn equality_is_by_pattern() {
        assert_eq!(Event::new("a").unwrap(), Event::new(String::from("a")).unwrap());
        assert_ne!(Event::new("a").unwrap(), Event::new("b").unwrap());
        assert_eq!(Event::rpc_server_started(), Event::new(RPC_SERVER_STARTED).unwrap());
    }

    #[test]
    fn special_characters_are_literal() {
        let event = Event::new("(UNDERTOW).*").unwrap();
        assert!(!event.is_observed_in("(UNDERTOW) started"));
        assert!(event.is_observed_in("x (UNDERTOW).* y"));
    }

    #[test]
    fn serializes_as_plain_string() {
        let event = Event::new("sealed").unwrap();
        assert_eq!(serde_json::to_string(&event).unwrap(), "\"sealed\"");
        assert!(serde_json::from_str::<Event>("\"\"").is_err());
    }
}

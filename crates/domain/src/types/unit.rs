//! Pending write units and the keys that correlate their results

use std::fmt;

use serde::{Deserialize, Serialize};

use super::fields::FieldMap;
use super::operation::Operation;

/// Maps one batch result item back to the caller that enqueued it.
///
/// A known identifier (primary key or alternate key) when available,
/// otherwise the item's position in its unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CorrelationKey {
    Key(String),
    Index(usize),
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// A batch that has not been delivered yet.
///
/// `payload` and `correlation_keys` are parallel: item `i` of the payload is
/// answered by result item `i`, which belongs to `correlation_keys[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWriteUnit {
    pub entity: String,
    pub operation: Operation,
    /// Remote method name, e.g. `addOrUpdateContacts`
    pub method: String,
    pub payload: Vec<FieldMap>,
    pub correlation_keys: Vec<CorrelationKey>,
    /// Number of prior failed submission attempts
    pub attempt_count: u32,
}

impl PendingWriteUnit {
    pub fn new(entity: impl Into<String>, operation: Operation, method: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            operation,
            method: method.into(),
            payload: Vec::new(),
            correlation_keys: Vec::new(),
            attempt_count: 0,
        }
    }

    /// Append one item; a missing key becomes the item's position.
    pub fn push(&mut self, item: FieldMap, key: Option<CorrelationKey>) -> CorrelationKey {
        let key = key.unwrap_or(CorrelationKey::Index(self.payload.len()));
        self.payload.push(item);
        self.correlation_keys.push(key.clone());
        key
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Copy of this unit after one more failed attempt.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self { attempt_count: self.attempt_count.saturating_add(1), ..self.clone() }
    }
}

/// Opaque handle for a stored unit (a file name for the file store).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryHandle(String);

impl RetryHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::fields::field_map;

    #[test]
    fn test_push_assigns_positional_keys() {
        let mut unit = PendingWriteUnit::new("Conversion", Operation::Add, "addConversion");
        let first = unit.push(field_map([("amount", json!(10))]), None);
        let second =
            unit.push(field_map([("amount", json!(20))]), Some(CorrelationKey::Key("o-2".into())));
        let third = unit.push(FieldMap::new(), None);

        assert_eq!(first, CorrelationKey::Index(0));
        assert_eq!(second, CorrelationKey::Key("o-2".to_string()));
        assert_eq!(third, CorrelationKey::Index(2));
        assert_eq!(unit.len(), unit.correlation_keys.len());
    }

    #[test]
    fn test_next_attempt_only_bumps_counter() {
        let mut unit = PendingWriteUnit::new("Contact", Operation::AddOrUpdate, "addOrUpdateContacts");
        unit.push(field_map([("email", json!("a@b.com"))]), None);

        let next = unit.next_attempt();
        assert_eq!(next.attempt_count, 1);
        assert_eq!(next.payload, unit.payload);
        assert_eq!(next.next_attempt().attempt_count, 2);
    }

    #[test]
    fn test_correlation_key_display() {
        assert_eq!(CorrelationKey::Key("a@b.com".into()).to_string(), "a@b.com");
        assert_eq!(CorrelationKey::Index(3).to_string(), "#3");
    }
}

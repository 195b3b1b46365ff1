//! Static per-entity metadata

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};

use super::fields::{has_value, key_string, present, FieldMap};
use super::operation::Operation;
use crate::errors::{MailwireError, Result};

/// Which writes an entity accepts at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mutability {
    #[default]
    Mutable,
    /// Records can be added once and never updated (conversions).
    AppendOnly,
    /// Records are read from the remote side only; they start read-only.
    ReadOnly,
}

/// How a lookup value is placed into a read filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupShape {
    /// `{"id": v}`
    Plain,
    /// `{"email": {"operator": "EqualTo", "value": v}}`
    EqualTo,
    /// `{"orderId": [v]}`
    Wrapped,
}

impl LookupShape {
    fn apply(self, value: &Value) -> Value {
        match self {
            Self::Plain => value.clone(),
            Self::EqualTo => json!({ "operator": "EqualTo", "value": value }),
            Self::Wrapped => Value::Array(vec![value.clone()]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupKey {
    pub field: String,
    pub shape: LookupShape,
}

impl LookupKey {
    pub fn new(field: impl Into<String>, shape: LookupShape) -> Self {
        Self { field: field.into(), shape }
    }
}

/// One way of identifying a record for `read()`.
///
/// Rules are tried in order; the first one that yields a non-empty filter
/// is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRule {
    /// Use this key if it is present.
    Single(LookupKey),
    /// Combine every present key of the group.
    AllOf(Vec<LookupKey>),
}

/// Value clean-up applied by `set()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldNormalizer {
    /// Strip whitespace and repair an address truncated after the final dot.
    Email,
}

impl FieldNormalizer {
    pub fn apply(self, value: Value) -> Value {
        match (self, value) {
            (Self::Email, Value::String(raw)) => {
                let mut email: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
                if email.ends_with('.') {
                    email.push_str("com");
                }
                Value::String(email)
            }
            (_, other) => other,
        }
    }
}

/// Immutable description of one remote entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    name: String,
    methods: BTreeMap<Operation, String>,
    primary_key: String,
    option_values: BTreeMap<String, BTreeSet<String>>,
    lookup: Vec<LookupRule>,
    required_filter_keys: Vec<String>,
    empty_filter: Option<FieldMap>,
    mutability: Mutability,
    upsert_by_default: bool,
    duplicate_code: Option<i64>,
    persist_key: Option<String>,
    normalizers: BTreeMap<String, FieldNormalizer>,
}

impl EntityDescriptor {
    pub fn builder(name: impl Into<String>) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn supports(&self, operation: Operation) -> bool {
        self.methods.contains_key(&operation)
    }

    pub fn supported_operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.methods.keys().copied()
    }

    pub fn method(&self, operation: Operation) -> Option<&str> {
        self.methods.get(&operation).map(String::as_str)
    }

    /// Remote method name, or `UnsupportedOperation`.
    pub fn require_method(&self, operation: Operation) -> Result<&str> {
        self.method(operation).ok_or_else(|| MailwireError::unsupported(&self.name, operation))
    }

    pub fn mutability(&self) -> Mutability {
        self.mutability
    }

    pub fn upsert_by_default(&self) -> bool {
        self.upsert_by_default
    }

    /// Remote code meaning "already exists"; a save hitting it refreshes instead.
    pub fn duplicate_code(&self) -> Option<i64> {
        self.duplicate_code
    }

    /// Alternate correlation field used by `persist()` without a primary key.
    pub fn persist_key(&self) -> Option<&str> {
        self.persist_key.as_deref()
    }

    pub fn option_values(&self, option: &str) -> Option<&BTreeSet<String>> {
        self.option_values.get(option)
    }

    pub fn is_valid_option_value(&self, option: &str, value: &str) -> bool {
        self.option_values.get(option).is_some_and(|values| values.contains(value))
    }

    /// Normalize a value about to be stored under `field`.
    pub fn normalize(&self, field: &str, value: Value) -> Value {
        match self.normalizers.iter().find(|(name, _)| name.eq_ignore_ascii_case(field)) {
            Some((_, normalizer)) => normalizer.apply(value),
            None => value,
        }
    }

    /// Build the read filter for a record, or `None` when no key is usable.
    pub fn lookup_filter(&self, fields: &FieldMap) -> Option<FieldMap> {
        self.lookup.iter().find_map(|rule| {
            let filter: FieldMap = match rule {
                LookupRule::Single(key) => present(fields, &key.field)
                    .map(|value| (key.field.clone(), key.shape.apply(value)))
                    .into_iter()
                    .collect(),
                LookupRule::AllOf(keys) => keys
                    .iter()
                    .filter_map(|key| {
                        present(fields, &key.field)
                            .map(|value| (key.field.clone(), key.shape.apply(value)))
                    })
                    .collect(),
            };
            (!filter.is_empty()).then_some(filter)
        })
    }

    /// Validate a read-all filter and return the filter to send.
    pub fn validate_filter(&self, filter: FieldMap) -> Result<FieldMap> {
        let filter = match (&self.empty_filter, filter.is_empty()) {
            (Some(default), true) => default.clone(),
            _ => filter,
        };

        if !self.required_filter_keys.is_empty()
            && !self.required_filter_keys.iter().any(|key| filter.contains_key(key))
        {
            return Err(MailwireError::InvalidInput(format!(
                "{} read requires a filter by one of: {}",
                self.name,
                self.required_filter_keys.join(", ")
            )));
        }

        for (option, value) in &filter {
            let Some(allowed) = self.option_values.get(option) else { continue };
            let candidates = match value {
                Value::Array(values) => values.iter().collect::<Vec<_>>(),
                other => vec![other],
            };
            for candidate in candidates.into_iter().filter(|v| has_value(v)) {
                let valid = key_string(candidate).is_some_and(|v| allowed.contains(&v));
                if !valid {
                    return Err(MailwireError::InvalidInput(format!(
                        "invalid {} value for {}: {}",
                        option, self.name, candidate
                    )));
                }
            }
        }

        Ok(filter)
    }
}

/// Builder for [`EntityDescriptor`]
#[derive(Debug, Clone)]
pub struct EntityDescriptorBuilder {
    inner: EntityDescriptor,
}

impl EntityDescriptorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: EntityDescriptor {
                name: name.into(),
                methods: BTreeMap::new(),
                primary_key: "id".to_string(),
                option_values: BTreeMap::new(),
                lookup: Vec::new(),
                required_filter_keys: Vec::new(),
                empty_filter: None,
                mutability: Mutability::Mutable,
                upsert_by_default: false,
                duplicate_code: None,
                persist_key: None,
                normalizers: BTreeMap::new(),
            },
        }
    }

    #[must_use]
    pub fn method(mut self, operation: Operation, name: impl Into<String>) -> Self {
        self.inner.methods.insert(operation, name.into());
        self
    }

    /// Register the conventional `<verb><Plural>` names for each operation.
    #[must_use]
    pub fn methods(mut self, plural: &str, operations: &[Operation]) -> Self {
        for operation in operations {
            self.inner.methods.insert(*operation, format!("{}{plural}", operation.as_str()));
        }
        self
    }

    #[must_use]
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.inner.primary_key = field.into();
        self
    }

    #[must_use]
    pub fn option_values<I, S>(mut self, option: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.option_values.insert(option.into(), values.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn lookup(mut self, field: impl Into<String>, shape: LookupShape) -> Self {
        self.inner.lookup.push(LookupRule::Single(LookupKey::new(field, shape)));
        self
    }

    #[must_use]
    pub fn lookup_all_of(mut self, keys: Vec<LookupKey>) -> Self {
        self.inner.lookup.push(LookupRule::AllOf(keys));
        self
    }

    #[must_use]
    pub fn required_filter_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.required_filter_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn empty_filter(mut self, filter: FieldMap) -> Self {
        self.inner.empty_filter = Some(filter);
        self
    }

    #[must_use]
    pub fn mutability(mut self, mutability: Mutability) -> Self {
        self.inner.mutability = mutability;
        self
    }

    #[must_use]
    pub fn upsert_by_default(mut self, upsert: bool) -> Self {
        self.inner.upsert_by_default = upsert;
        self
    }

    #[must_use]
    pub fn duplicate_code(mut self, code: i64) -> Self {
        self.inner.duplicate_code = Some(code);
        self
    }

    #[must_use]
    pub fn persist_key(mut self, field: impl Into<String>) -> Self {
        self.inner.persist_key = Some(field.into());
        self
    }

    #[must_use]
    pub fn normalize(mut self, field: impl Into<String>, normalizer: FieldNormalizer) -> Self {
        self.inner.normalizers.insert(field.into(), normalizer);
        self
    }

    pub fn build(self) -> EntityDescriptor {
        self.inner
    }
}

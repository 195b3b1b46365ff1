//! Ordered per-item outcomes of one batch call

use serde::{Deserialize, Serialize};

use super::fields::FieldMap;

/// Outcome of one item in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItem {
    Success {
        #[serde(default)]
        fields: FieldMap,
        #[serde(default)]
        is_new: bool,
    },
    Failure {
        code: i64,
        message: String,
    },
}

impl BatchItem {
    pub fn success(fields: FieldMap) -> Self {
        Self::Success { fields, is_new: false }
    }

    pub fn created(fields: FieldMap) -> Self {
        Self::Success { fields, is_new: true }
    }

    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Self::Failure { code, message: message.into() }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub const fn fields(&self) -> Option<&FieldMap> {
        match self {
            Self::Success { fields, .. } => Some(fields),
            Self::Failure { .. } => None,
        }
    }
}

/// A failing item, with its position in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    pub index: usize,
    pub code: i64,
    pub message: String,
}

/// Result set produced by every batch submission.
///
/// Partial success is normal: a failing item never hides the data of the
/// items that succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    items: Vec<BatchItem>,
}

impl BatchResult {
    /// Build a result set from the decoded response items, in response order.
    pub fn from_items(items: Vec<BatchItem>) -> Self {
        Self { items }
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|item| !item.is_success())
    }

    /// First failing item in batch order.
    pub fn first_error(&self) -> Option<BatchError> {
        self.errors().next()
    }

    pub fn errors(&self) -> impl Iterator<Item = BatchError> + '_ {
        self.items.iter().enumerate().filter_map(|(index, item)| match item {
            BatchItem::Failure { code, message } => {
                Some(BatchError { index, code: *code, message: message.clone() })
            }
            BatchItem::Success { .. } => None,
        })
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|item| !item.is_success()).count()
    }

    /// Returned fields of item `index`; `None` for failures or out of range.
    pub fn data(&self, index: usize) -> Option<&FieldMap> {
        self.items.get(index).and_then(BatchItem::fields)
    }

    pub fn item(&self, index: usize) -> Option<&BatchItem> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BatchItem> {
        self.items.iter()
    }

    pub fn into_items(self) -> Vec<BatchItem> {
        self.items
    }
}

impl<'a> IntoIterator for &'a BatchResult {
    type Item = &'a BatchItem;
    type IntoIter = std::slice::Iter<'a, BatchItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

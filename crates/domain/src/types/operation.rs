//! Batch verbs understood by the remote API

use serde::{Deserialize, Serialize};

use crate::impl_wire_name_conversions;

/// A batch verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Add,
    Update,
    Delete,
    AddOrUpdate,
    Read,
}

impl_wire_name_conversions!(Operation {
    Add => "add",
    Update => "update",
    Delete => "delete",
    AddOrUpdate => "addOrUpdate",
    Read => "read",
});

impl Operation {
    /// Verbs that can be buffered in the write cache.
    pub const WRITES: [Self; 4] = [Self::Add, Self::Update, Self::Delete, Self::AddOrUpdate];

    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Read)
    }

    /// Add-class verbs create the remote object when it does not exist yet.
    pub const fn creates(self) -> bool {
        matches!(self, Self::Add | Self::AddOrUpdate)
    }
}

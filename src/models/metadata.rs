//! Key-value metadata rows shared by accounts, containers and objects.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One `X-{Account,Container,Object}-Meta-*` entry.
///
/// Keys are stored lowercase with the header prefix removed, so
/// `X-Container-Meta-Search-Enabled: true` becomes `search-enabled` → `true`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

/// Table holding metadata for one kind of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataTable {
    Account,
    Container,
    Object,
}

impl MetadataTable {
    pub fn table(self) -> &'static str {
        match self {
            Self::Account => "account_metadata",
            Self::Container => "container_metadata",
            Self::Object => "object_metadata",
        }
    }

    pub fn owner_column(self) -> &'static str {
        match self {
            Self::Account => "account_id",
            Self::Container => "container_id",
            Self::Object => "object_id",
        }
    }

    /// Request/response header prefix, e.g. `x-container-meta-`.
    pub fn header_prefix(self) -> &'static str {
        match self {
            Self::Account => "x-account-meta-",
            Self::Container => "x-container-meta-",
            Self::Object => "x-object-meta-",
        }
    }
}

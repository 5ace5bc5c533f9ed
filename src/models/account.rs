//! Represents an account — the top-level namespace owning containers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage account.
///
/// Accounts own containers and carry their own `X-Account-Meta-*` entries,
/// stored separately in `account_metadata`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Account {
    /// Unique identifier for this account (UUID for internal DB use).
    pub id: Uuid,

    /// Account name as it appears in `/v1/{account}`.
    pub name: String,

    /// When this account was created.
    pub created_at: DateTime<Utc>,
}

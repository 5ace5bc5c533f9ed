//! Represents a container — a namespace for objects inside an account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A container within an account.
///
/// Container names are unique per account. Like accounts, containers carry
/// `X-Container-Meta-*` entries in `container_metadata`; the
/// `search-enabled` entry is what opts a container into metadata queueing.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Container {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Owning account.
    pub account_id: Uuid,

    /// Container name as it appears in `/v1/{account}/{container}`.
    pub name: String,

    /// When this container was created.
    pub created_at: DateTime<Utc>,
}

//! Core data models for the account/container/object store.
//!
//! These entities represent the logical structure of accounts, containers
//! and objects. They map cleanly to database tables via `sqlx::FromRow` and
//! serialize naturally as JSON via `serde`.

pub mod account;
pub mod container;
pub mod metadata;
pub mod object;

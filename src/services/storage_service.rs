//! src/services/storage_service.rs
//!
//! StorageService — account/container/object operations backed by SQLite for
//! records and metadata, and local disk for object payloads sharded beneath
//! `base_path/{account}/{container}/{shard}/{shard}/{key}`.
//!
//! The service also answers scope metadata lookups for the metadata queuer
//! (see the `ScopeMetadataStore` impl at the bottom); that path only reads.

use crate::{
    models::{
        account::Account,
        container::Container,
        metadata::{MetadataEntry, MetadataTable},
        object::Object,
    },
    queuer::scope::{Scope, ScopeMetadataStore, ScopeStoreError},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("account `{0}` not found")]
    AccountNotFound(String),
    #[error("account `{0}` still has containers")]
    AccountNotEmpty(String),
    #[error("container `{account}/{container}` not found")]
    ContainerNotFound { account: String, container: String },
    #[error("container `{account}/{container}` is not empty")]
    ContainerNotEmpty { account: String, container: String },
    #[error("{kind} name `{name}` invalid: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },
    #[error("object `{key}` not found in container `{container}`")]
    ObjectNotFound { container: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata changes from request headers: `(key, value)` with the header
/// prefix stripped. An empty value removes the key.
pub type MetadataUpdates = [(String, String)];

/// StorageService provides the storage operations behind `/v1`:
/// - Accounts and containers: create, update metadata, read metadata, delete
/// - Objects: streamed upload, download, metadata read/replace, delete
///
/// Writes to disk go through a temp file and an atomic rename; metadata rows
/// live in SQLite.
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_NAME_LEN: usize = 256;

impl StorageService {
    /// Create a new StorageService backed by the provided SQLite pool and
    /// using `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that begin with `/` or contain `..`.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate an account or container name.
    ///
    /// Names become a single directory level on disk, so they must be
    /// non-empty, at most 256 bytes, free of `/`, `\` and control
    /// characters, and not `.` or `..`.
    fn ensure_name_safe(&self, kind: &'static str, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidName {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        };

        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(invalid("must be between 1 and 256 bytes"));
        }
        if name == "." || name == ".." {
            return Err(invalid("cannot be a relative path component"));
        }
        if name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(invalid("cannot contain slashes or control characters"));
        }
        Ok(())
    }

    fn account_root(&self, account: &str) -> PathBuf {
        self.base_path.join(account)
    }

    fn container_root(&self, account: &str, container: &str) -> PathBuf {
        self.account_root(account).join(container)
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(account/container/key) and returns the first two bytes as
    /// lowercase hexadecimal strings (00–ff).
    fn object_shards(account: &str, container: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}/{}", account, container, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Construct a fully-qualified object payload path.
    ///
    /// Combines base_path/account/container/{shard}/{shard}/{key}.
    /// Parent directories may not exist yet.
    fn object_path(&self, account: &str, container: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(account, container, key);
        let mut path = self.container_root(account, container);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_account(&self, name: &str) -> StorageResult<Account> {
        self.ensure_name_safe("account", name)?;
        sqlx::query_as::<_, Account>("SELECT id, name, created_at FROM accounts WHERE name = ?")
            .bind(name)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StorageError::AccountNotFound(name.to_string()),
                other => StorageError::Sqlx(other),
            })
    }

    async fn fetch_container(
        &self,
        account: &str,
        container: &str,
    ) -> StorageResult<(Account, Container)> {
        let account_rec = self.fetch_account(account).await?;
        self.ensure_name_safe("container", container)?;
        let container_rec = sqlx::query_as::<_, Container>(
            "SELECT id, account_id, name, created_at
             FROM containers WHERE account_id = ? AND name = ?",
        )
        .bind(account_rec.id)
        .bind(container)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ContainerNotFound {
                account: account.to_string(),
                container: container.to_string(),
            },
            other => StorageError::Sqlx(other),
        })?;
        Ok((account_rec, container_rec))
    }

    /// Fetch a non-deleted object record.
    async fn fetch_object(&self, container: &Container, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(
            "SELECT id, container_id, key, filename, content_type, size_bytes, etag,
                    last_modified, is_deleted
             FROM objects
             WHERE key = ? AND container_id = ? AND is_deleted = 0",
        )
        .bind(key)
        .bind(container.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                container: container.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    async fn load_metadata(
        &self,
        table: MetadataTable,
        owner: Uuid,
    ) -> StorageResult<HashMap<String, String>> {
        let sql = format!(
            "SELECT key, value FROM {} WHERE {} = ?",
            table.table(),
            table.owner_column()
        );
        let rows = sqlx::query_as::<_, MetadataEntry>(&sql)
            .bind(owner)
            .fetch_all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(|e| (e.key, e.value)).collect())
    }

    /// Upsert non-empty values, delete keys whose value is empty.
    async fn apply_metadata(
        &self,
        table: MetadataTable,
        owner: Uuid,
        updates: &MetadataUpdates,
    ) -> StorageResult<()> {
        let upsert = format!(
            "INSERT INTO {table} ({owner_col}, key, value) VALUES (?, ?, ?)
             ON CONFLICT({owner_col}, key) DO UPDATE SET value = excluded.value",
            table = table.table(),
            owner_col = table.owner_column()
        );
        let delete = format!(
            "DELETE FROM {} WHERE {} = ? AND key = ?",
            table.table(),
            table.owner_column()
        );

        let mut tx = self.db.begin().await?;
        for (key, value) in updates {
            if value.is_empty() {
                sqlx::query(&delete)
                    .bind(owner)
                    .bind(key)
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query(&upsert)
                    .bind(owner)
                    .bind(key)
                    .bind(value)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Replace the whole metadata set of an owner.
    async fn replace_metadata(
        &self,
        table: MetadataTable,
        owner: Uuid,
        entries: &MetadataUpdates,
    ) -> StorageResult<()> {
        let clear = format!(
            "DELETE FROM {} WHERE {} = ?",
            table.table(),
            table.owner_column()
        );
        let insert = format!(
            "INSERT OR REPLACE INTO {} ({}, key, value) VALUES (?, ?, ?)",
            table.table(),
            table.owner_column()
        );

        let mut tx = self.db.begin().await?;
        sqlx::query(&clear).bind(owner).execute(&mut *tx).await?;
        for (key, value) in entries.iter().filter(|(_, v)| !v.is_empty()) {
            sqlx::query(&insert)
                .bind(owner)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Create an account if missing and apply `metadata` either way.
    ///
    /// Returns `true` when the account was created by this call.
    pub async fn put_account(&self, name: &str, metadata: &MetadataUpdates) -> StorageResult<bool> {
        self.ensure_name_safe("account", name)?;
        let created = match sqlx::query(
            "INSERT INTO accounts (id, name, created_at) VALUES (?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(Utc::now())
        .execute(&*self.db)
        .await
        {
            Ok(_) => true,
            Err(err) if is_unique_violation(&err) => false,
            Err(err) => return Err(StorageError::Sqlx(err)),
        };

        let account = self.fetch_account(name).await?;
        self.apply_metadata(MetadataTable::Account, account.id, metadata)
            .await?;
        Ok(created)
    }

    pub async fn post_account_metadata(
        &self,
        name: &str,
        metadata: &MetadataUpdates,
    ) -> StorageResult<()> {
        let account = self.fetch_account(name).await?;
        self.apply_metadata(MetadataTable::Account, account.id, metadata)
            .await
    }

    pub async fn account_metadata(&self, name: &str) -> StorageResult<HashMap<String, String>> {
        let account = self.fetch_account(name).await?;
        self.load_metadata(MetadataTable::Account, account.id).await
    }

    /// Delete an empty account and its directory.
    pub async fn delete_account(&self, name: &str) -> StorageResult<()> {
        let account = self.fetch_account(name).await?;
        let containers =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM containers WHERE account_id = ?")
                .bind(account.id)
                .fetch_one(&*self.db)
                .await?;
        if containers > 0 {
            return Err(StorageError::AccountNotEmpty(name.to_string()));
        }

        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(account.id)
            .execute(&*self.db)
            .await?;

        remove_dir_best_effort(&self.account_root(name)).await;
        Ok(())
    }

    /// Create a container if missing and apply `metadata` either way.
    ///
    /// Returns `true` when the container was created by this call.
    pub async fn put_container(
        &self,
        account: &str,
        name: &str,
        metadata: &MetadataUpdates,
    ) -> StorageResult<bool> {
        let account_rec = self.fetch_account(account).await?;
        self.ensure_name_safe("container", name)?;

        let created = match sqlx::query(
            "INSERT INTO containers (id, account_id, name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(account_rec.id)
        .bind(name)
        .bind(Utc::now())
        .execute(&*self.db)
        .await
        {
            Ok(_) => true,
            Err(err) if is_unique_violation(&err) => false,
            Err(err) => return Err(StorageError::Sqlx(err)),
        };

        fs::create_dir_all(self.container_root(account, name)).await?;

        let (_, container) = self.fetch_container(account, name).await?;
        self.apply_metadata(MetadataTable::Container, container.id, metadata)
            .await?;
        Ok(created)
    }

    pub async fn post_container_metadata(
        &self,
        account: &str,
        name: &str,
        metadata: &MetadataUpdates,
    ) -> StorageResult<()> {
        let (_, container) = self.fetch_container(account, name).await?;
        self.apply_metadata(MetadataTable::Container, container.id, metadata)
            .await
    }

    pub async fn container_metadata(
        &self,
        account: &str,
        name: &str,
    ) -> StorageResult<HashMap<String, String>> {
        let (_, container) = self.fetch_container(account, name).await?;
        self.load_metadata(MetadataTable::Container, container.id)
            .await
    }

    /// Delete an empty container and its directory.
    ///
    /// Soft-deleted object rows do not count as content and are removed with
    /// the container.
    pub async fn delete_container(&self, account: &str, name: &str) -> StorageResult<()> {
        let (_, container) = self.fetch_container(account, name).await?;
        let live = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM objects WHERE container_id = ? AND is_deleted = 0",
        )
        .bind(container.id)
        .fetch_one(&*self.db)
        .await?;
        if live > 0 {
            return Err(StorageError::ContainerNotEmpty {
                account: account.to_string(),
                container: name.to_string(),
            });
        }

        sqlx::query("DELETE FROM containers WHERE id = ?")
            .bind(container.id)
            .execute(&*self.db)
            .await?;

        remove_dir_best_effort(&self.container_root(account, name)).await;
        Ok(())
    }

    /// Stream-upload an object to disk and update its record.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Atomically renames into final location.
    /// - Upserts the record (overwrite semantics) and replaces its metadata.
    ///
    /// Ensures durable writes (fsync) and cleans up temp files on errors.
    pub async fn upload_object_stream<S>(
        &self,
        account: &str,
        container: &str,
        key: &str,
        content_type: Option<String>,
        metadata: &MetadataUpdates,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        let (_, container_rec) = self.fetch_container(account, container).await?;

        let file_path = self.object_path(account, container, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        let etag = format!("{:x}", digest.compute());

        let insert_result = sqlx::query_as::<_, Object>(
            r#"
            INSERT INTO objects (
                id, container_id, key, filename, content_type, size_bytes,
                etag, last_modified, is_deleted
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(container_id, key) DO UPDATE SET
                filename = excluded.filename,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified,
                is_deleted = 0
            RETURNING id, container_id, key, filename, content_type, size_bytes,
                      etag, last_modified, is_deleted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(container_rec.id)
        .bind(key)
        .bind(&filename)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        let object = match insert_result {
            Ok(obj) => obj,
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                return Err(StorageError::Sqlx(err));
            }
        };

        self.replace_metadata(MetadataTable::Object, object.id, metadata)
            .await?;
        Ok(object)
    }

    /// Fetch an object for reading.
    ///
    /// Returns the record, its metadata and an opened File handle ready for
    /// streaming out. Returns ObjectNotFound if the record exists but the
    /// physical file is missing.
    pub async fn get_object_reader(
        &self,
        account: &str,
        container: &str,
        key: &str,
    ) -> StorageResult<(Object, HashMap<String, String>, File)> {
        let (object, metadata) = self.get_object_metadata(account, container, key).await?;

        let file_path = self.object_path(account, container, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    container: container.to_string(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, metadata, file))
    }

    /// Fetch the object record and its metadata.
    pub async fn get_object_metadata(
        &self,
        account: &str,
        container: &str,
        key: &str,
    ) -> StorageResult<(Object, HashMap<String, String>)> {
        self.ensure_key_safe(key)?;
        let (_, container_rec) = self.fetch_container(account, container).await?;
        let object = self.fetch_object(&container_rec, key).await?;
        let metadata = self.load_metadata(MetadataTable::Object, object.id).await?;
        Ok((object, metadata))
    }

    /// Replace all metadata of an existing object (POST semantics).
    pub async fn post_object_metadata(
        &self,
        account: &str,
        container: &str,
        key: &str,
        metadata: &MetadataUpdates,
    ) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let (_, container_rec) = self.fetch_container(account, container).await?;
        let object = self.fetch_object(&container_rec, key).await?;
        self.replace_metadata(MetadataTable::Object, object.id, metadata)
            .await?;
        Ok(object)
    }

    /// Soft-delete an object and attempt to remove its payload.
    ///
    /// - Sets `is_deleted = 1`
    /// - Deletes physical file best-effort
    /// - Prunes empty shard directories
    ///
    /// Repeated calls return ObjectNotFound once the object is gone.
    pub async fn delete_object(
        &self,
        account: &str,
        container: &str,
        key: &str,
    ) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let (_, container_rec) = self.fetch_container(account, container).await?;
        let object = self.fetch_object(&container_rec, key).await?;

        let result =
            sqlx::query("UPDATE objects SET is_deleted = 1 WHERE key = ? AND container_id = ?")
                .bind(key)
                .bind(container_rec.id)
                .execute(&*self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ObjectNotFound {
                container: container.to_string(),
                key: key.to_string(),
            });
        }

        let file_path = self.object_path(account, container, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let container_root = self.container_root(account, container);
            self.prune_empty_dirs(parent, &container_root).await;
        }

        Ok(object)
    }

    /// Recursively remove empty directories up to the container root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ScopeMetadataStore for StorageService {
    async fn scope_metadata(
        &self,
        scope: &Scope,
    ) -> Result<Option<HashMap<String, String>>, ScopeStoreError> {
        let result = match scope.container.as_deref() {
            Some(container) => self.container_metadata(&scope.account, container).await,
            None => self.account_metadata(&scope.account).await,
        };

        match result {
            Ok(metadata) => Ok(Some(metadata)),
            Err(
                StorageError::AccountNotFound(_)
                | StorageError::ContainerNotFound { .. }
                | StorageError::InvalidName { .. },
            ) => Ok(None),
            Err(err) => Err(ScopeStoreError::Backend(err.to_string())),
        }
    }
}

async fn remove_dir_best_effort(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path).await {
        if err.kind() != io::ErrorKind::NotFound {
            debug!("failed to remove directory {}: {}", path.display(), err);
        }
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db;
    use crate::queuer::OPT_IN_KEY;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    /// Service over an in-memory database and a throwaway directory.
    pub(crate) async fn test_service() -> (StorageService, TempDir) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        (StorageService::new(Arc::new(pool), dir.path()), dir)
    }

    fn meta(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn body(bytes: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        futures::stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(bytes))])
    }

    #[tokio::test]
    async fn put_account_reports_creation_once() {
        let (service, _dir) = test_service().await;
        assert!(service.put_account("A", &[]).await.unwrap());
        assert!(!service.put_account("A", &[]).await.unwrap());
    }

    #[tokio::test]
    async fn metadata_updates_upsert_and_empty_values_remove() {
        let (service, _dir) = test_service().await;
        service.put_account("A", &[]).await.unwrap();
        service
            .put_container("A", "C", &meta(&[(OPT_IN_KEY, "true"), ("owner", "ops")]))
            .await
            .unwrap();

        let current = service.container_metadata("A", "C").await.unwrap();
        assert_eq!(current.get(OPT_IN_KEY).map(String::as_str), Some("true"));
        assert_eq!(current.len(), 2);

        service
            .post_container_metadata("A", "C", &meta(&[(OPT_IN_KEY, "")]))
            .await
            .unwrap();
        let current = service.container_metadata("A", "C").await.unwrap();
        assert!(!current.contains_key(OPT_IN_KEY));
        assert_eq!(current.get("owner").map(String::as_str), Some("ops"));
    }

    #[tokio::test]
    async fn upload_read_and_delete_object() {
        let (service, _dir) = test_service().await;
        service.put_account("A", &[]).await.unwrap();
        service.put_container("A", "C", &[]).await.unwrap();

        let object = service
            .upload_object_stream(
                "A",
                "C",
                "docs/readme.txt",
                Some("text/plain".into()),
                &meta(&[("color", "red")]),
                body(b"hello"),
            )
            .await
            .unwrap();
        assert_eq!(object.size_bytes, 5);
        assert_eq!(object.filename, "readme.txt");
        assert_eq!(
            object.etag.as_deref(),
            Some("5d41402abc4b2a76b9719d911017c592")
        );

        let (_, metadata, mut file) = service
            .get_object_reader("A", "C", "docs/readme.txt")
            .await
            .unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).await.unwrap();
        assert_eq!(contents, "hello");
        assert_eq!(metadata.get("color").map(String::as_str), Some("red"));

        service
            .delete_object("A", "C", "docs/readme.txt")
            .await
            .unwrap();
        assert!(matches!(
            service.get_object_metadata("A", "C", "docs/readme.txt").await,
            Err(StorageError::ObjectNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn post_replaces_object_metadata() {
        let (service, _dir) = test_service().await;
        service.put_account("A", &[]).await.unwrap();
        service.put_container("A", "C", &[]).await.unwrap();
        service
            .upload_object_stream("A", "C", "o", None, &meta(&[("a", "1"), ("b", "2")]), body(b"x"))
            .await
            .unwrap();

        service
            .post_object_metadata("A", "C", "o", &meta(&[("c", "3")]))
            .await
            .unwrap();

        let (_, metadata) = service.get_object_metadata("A", "C", "o").await.unwrap();
        assert_eq!(metadata, HashMap::from([("c".to_string(), "3".to_string())]));
    }

    #[tokio::test]
    async fn non_empty_scopes_cannot_be_deleted() {
        let (service, _dir) = test_service().await;
        service.put_account("A", &[]).await.unwrap();
        service.put_container("A", "C", &[]).await.unwrap();
        service
            .upload_object_stream("A", "C", "o", None, &[], body(b"x"))
            .await
            .unwrap();

        assert!(matches!(
            service.delete_container("A", "C").await,
            Err(StorageError::ContainerNotEmpty { .. })
        ));
        assert!(matches!(
            service.delete_account("A").await,
            Err(StorageError::AccountNotEmpty(_))
        ));

        service.delete_object("A", "C", "o").await.unwrap();
        service.delete_container("A", "C").await.unwrap();
        service.delete_account("A").await.unwrap();
        assert!(matches!(
            service.account_metadata("A").await,
            Err(StorageError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_unsafe_names_and_keys() {
        let (service, _dir) = test_service().await;
        assert!(matches!(
            service.put_account("..", &[]).await,
            Err(StorageError::InvalidName { .. })
        ));
        service.put_account("A", &[]).await.unwrap();
        service.put_container("A", "C", &[]).await.unwrap();
        assert!(matches!(
            service
                .upload_object_stream("A", "C", "../escape", None, &[], body(b"x"))
                .await,
            Err(StorageError::InvalidObjectKey)
        ));
    }

    #[tokio::test]
    async fn scope_lookup_distinguishes_missing_scopes() {
        let (service, _dir) = test_service().await;
        service
            .put_account("A", &meta(&[(OPT_IN_KEY, "yes")]))
            .await
            .unwrap();
        service.put_container("A", "C", &[]).await.unwrap();

        let account = service
            .scope_metadata(&Scope::account("A"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.get(OPT_IN_KEY).map(String::as_str), Some("yes"));

        let container = service
            .scope_metadata(&Scope::container("A", "C"))
            .await
            .unwrap()
            .unwrap();
        assert!(container.is_empty());

        assert!(service
            .scope_metadata(&Scope::container("A", "missing"))
            .await
            .unwrap()
            .is_none());
        assert!(service
            .scope_metadata(&Scope::account("nobody"))
            .await
            .unwrap()
            .is_none());
    }
}

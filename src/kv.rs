//! Key-value store for salonbook.
//!
//! All application state is persisted as serialized text under string keys,
//! mirroring the shared key-value store the records were originally kept in.
//! The store is backed by `SQLite` and enforces an optional byte quota: a
//! write that would push total usage past the quota is abandoned with
//! [`Error::QuotaExceeded`] and nothing is partially persisted.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Statements run on every open. Idempotent.
const SCHEMA_STATEMENTS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    ",
];

/// A quota-limited string key-value store.
#[derive(Debug)]
pub struct KvStore {
    /// Path to the store file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
    /// Maximum total bytes across keys and values, if limited.
    quota_bytes: Option<u64>,
}

impl KvStore {
    /// Open or create a store at the given path.
    ///
    /// Creates the parent directories and store file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>, quota_bytes: Option<u64>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::StoreOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::initialize_schema(&conn)?;

        info!("Store opened at {}", path.display());
        Ok(Self {
            path,
            conn,
            quota_bytes,
        })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory(quota_bytes: Option<u64>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::StoreOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        Self::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
            quota_bytes,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<()> {
        for statement in SCHEMA_STATEMENTS {
            conn.execute(statement, [])?;
        }
        Ok(())
    }

    /// Get the path to the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the configured quota in bytes, if any.
    #[must_use]
    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_bytes
    }

    /// Read the value stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write `value` under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuotaExceeded`] if the write would push total usage
    /// past the configured quota; the store is left unchanged. Returns an
    /// error if the underlying write fails.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_quota(key, value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove the value stored under `key`.
    ///
    /// Returns `true` if a value was removed, `false` if the key was absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying delete fails.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(affected > 0)
    }

    /// Check whether `key` currently holds a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub fn contains(&self, key: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM kv WHERE key = ?1",
            [key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List all keys beginning with `prefix`, in ascending key order.
    ///
    /// Used only to rebuild the snapshot index; routine listings go through
    /// the index instead of scanning the key space.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        // LIKE wildcards in the prefix itself would over-match; the key
        // prefixes used here contain none.
        let pattern = format!("{prefix}%");
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv WHERE key LIKE ?1 ORDER BY key ASC")?;
        let keys = stmt
            .query_map([pattern], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Total bytes used across all keys and values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub fn used_bytes(&self) -> Result<u64> {
        let used: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        Ok(used.try_into().unwrap_or(0))
    }

    /// Number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub fn len(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count.try_into().unwrap_or(0))
    }

    /// Check whether the store holds no keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Verify that writing `value` under `key` stays within the quota.
    fn check_quota(&self, key: &str, value: &str) -> Result<()> {
        let Some(limit) = self.quota_bytes else {
            return Ok(());
        };

        let existing: i64 = self
            .conn
            .query_row(
                "SELECT LENGTH(key) + LENGTH(value) FROM kv WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        let incoming = (key.len() + value.len()) as u64;
        let projected = self.used_bytes()? - u64::try_from(existing).unwrap_or(0) + incoming;
        if projected > limit {
            return Err(Error::QuotaExceeded {
                attempted: incoming,
                limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> KvStore {
        KvStore::open_in_memory(None).expect("failed to create test store")
    }

    #[test]
    fn test_open_in_memory() {
        let store = KvStore::open_in_memory(None);
        assert!(store.is_ok());
    }

    #[test]
    fn test_set_and_get() {
        let store = create_test_store();
        store.set("greeting", "hello").unwrap();
        assert_eq!(store.get("greeting").unwrap(), Some("hello".to_string()));
    }

    #[test]
    fn test_get_absent() {
        let store = create_test_store();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_set_replaces() {
        let store = create_test_store();
        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("two".to_string()));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_remove() {
        let store = create_test_store();
        store.set("k", "v").unwrap();
        assert!(store.remove("k").unwrap());
        assert_eq!(store.get("k").unwrap(), None);
        assert!(!store.remove("k").unwrap());
    }

    #[test]
    fn test_contains() {
        let store = create_test_store();
        assert!(!store.contains("k").unwrap());
        store.set("k", "v").unwrap();
        assert!(store.contains("k").unwrap());
    }

    #[test]
    fn test_keys_with_prefix_ordered() {
        let store = create_test_store();
        store.set("backup_0000000000003", "c").unwrap();
        store.set("backup_0000000000001", "a").unwrap();
        store.set("backup_0000000000002", "b").unwrap();
        store.set("other_key", "x").unwrap();

        let keys = store.keys_with_prefix("backup_").unwrap();
        assert_eq!(
            keys,
            vec![
                "backup_0000000000001",
                "backup_0000000000002",
                "backup_0000000000003"
            ]
        );
    }

    #[test]
    fn test_keys_with_prefix_empty() {
        let store = create_test_store();
        assert!(store.keys_with_prefix("backup_").unwrap().is_empty());
    }

    #[test]
    fn test_used_bytes() {
        let store = create_test_store();
        assert_eq!(store.used_bytes().unwrap(), 0);

        store.set("ab", "cdef").unwrap();
        assert_eq!(store.used_bytes().unwrap(), 6);
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let store = KvStore::open_in_memory(Some(10)).unwrap();
        let result = store.set("key", "a value that is too long");
        assert!(result.is_err());
        assert!(result.unwrap_err().is_quota_exceeded());
        // Nothing was written
        assert_eq!(store.get("key").unwrap(), None);
    }

    #[test]
    fn test_quota_allows_within_limit() {
        let store = KvStore::open_in_memory(Some(10)).unwrap();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_quota_accounts_for_replaced_value() {
        let store = KvStore::open_in_memory(Some(10)).unwrap();
        store.set("k", "123456789").unwrap(); // 10 bytes total
        // Replacing with an equal-sized value still fits
        store.set("k", "987654321").unwrap();
        // Growing past the limit does not
        assert!(store.set("k", "1234567890").is_err());
        assert_eq!(store.get("k").unwrap(), Some("987654321".to_string()));
    }

    #[test]
    fn test_quota_counts_across_keys() {
        let store = KvStore::open_in_memory(Some(8)).unwrap();
        store.set("a", "123").unwrap(); // 4 bytes
        store.set("b", "123").unwrap(); // 8 bytes total
        assert!(store.set("c", "1").unwrap_err().is_quota_exceeded());
    }

    #[test]
    fn test_len_and_is_empty() {
        let store = create_test_store();
        assert!(store.is_empty().unwrap());
        store.set("k", "v").unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn test_unicode_values() {
        let store = create_test_store();
        store.set("name", "田中 花子").unwrap();
        assert_eq!(store.get("name").unwrap(), Some("田中 花子".to_string()));
    }

    #[test]
    fn test_open_file_based() {
        let temp_dir = std::env::temp_dir();
        let db_path = temp_dir.join(format!("salonbook_kv_test_{}.db", std::process::id()));

        let store = KvStore::open(&db_path, None).unwrap();
        store.set("k", "v").unwrap();
        assert_eq!(store.path(), db_path);
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));

        drop(store);
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp_dir = std::env::temp_dir();
        let nested_path = temp_dir.join(format!(
            "salonbook_kv_test_{}/nested/records.db",
            std::process::id()
        ));

        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }

        let store = KvStore::open(&nested_path, None).unwrap();
        assert!(nested_path.exists());

        drop(store);
        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent.parent().unwrap());
        }
    }
}

//! SQLite-backed revision store.

use std::{
    fmt,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{BoundingBox, CacheRevision, OriginTag, RevisionId, RevisionParts};

use super::{RevisionStore, RevisionStoreError, StoreMetadata};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS revisions (
    id TEXT PRIMARY KEY,
    min_x REAL NOT NULL,
    min_y REAL NOT NULL,
    max_x REAL NOT NULL,
    max_y REAL NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    size_bytes INTEGER NOT NULL,
    compressed INTEGER NOT NULL,
    schema_version INTEGER NOT NULL,
    origin TEXT NOT NULL,
    record_count INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS revisions_created_at ON revisions (created_at);
CREATE INDEX IF NOT EXISTS revisions_origin ON revisions (origin);
CREATE TABLE IF NOT EXISTS payloads (
    revision_id TEXT PRIMARY KEY REFERENCES revisions (id) ON DELETE CASCADE,
    data BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS metadata (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    total_size INTEGER NOT NULL,
    revision_count INTEGER NOT NULL,
    last_cleanup INTEGER
);
INSERT OR IGNORE INTO metadata (id, total_size, revision_count, last_cleanup)
VALUES (0, 0, 0, NULL);
";

const REFRESH_METADATA: &str = "
UPDATE metadata SET
    total_size = (SELECT COALESCE(SUM(LENGTH(data)), 0) FROM payloads),
    revision_count = (SELECT COUNT(*) FROM revisions)
WHERE id = 0
";

const SELECT_REVISIONS: &str = "
SELECT id, min_x, min_y, max_x, max_y, created_at, expires_at, size_bytes,
       compressed, schema_version, origin, record_count
FROM revisions
ORDER BY created_at, id
";

/// Revision store persisting to a single SQLite database.
///
/// Every write runs in one transaction and the aggregate row is refreshed
/// inside it, so readers never observe a revision without its payload.
pub struct SqliteRevisionStore {
    connection: Mutex<Connection>,
}

impl fmt::Debug for SqliteRevisionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteRevisionStore").finish_non_exhaustive()
    }
}

impl SqliteRevisionStore {
    /// Open or create the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RevisionStoreError> {
        let path = path.as_ref();
        let connection =
            Connection::open(path).map_err(|source| RevisionStoreError::OpenDatabase {
                path: path.to_path_buf(),
                source,
            })?;
        Self::with_connection(connection)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, RevisionStoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<Self, RevisionStoreError> {
        connection.pragma_update(None, "foreign_keys", true)?;
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RevisionStore for SqliteRevisionStore {
    fn put_revision(
        &self,
        revision: &CacheRevision,
        payload: &[u8],
    ) -> Result<(), RevisionStoreError> {
        let mut connection = self.lock();
        let tx = connection.transaction()?;
        let exists = tx
            .query_row(
                "SELECT 1 FROM revisions WHERE id = ?1",
                [revision.id().as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Err(RevisionStoreError::DuplicateRevision {
                id: revision.id().clone(),
            });
        }

        let [min_x, min_y, max_x, max_y] = revision.bbox().to_array();
        tx.execute(
            "INSERT INTO revisions (
                id, min_x, min_y, max_x, max_y, created_at, expires_at, size_bytes,
                compressed, schema_version, origin, record_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                revision.id().as_str(),
                min_x,
                min_y,
                max_x,
                max_y,
                revision.created_at().timestamp_millis(),
                revision.expires_at().timestamp_millis(),
                revision.size_bytes(),
                revision.compressed(),
                revision.schema_version(),
                revision.origin().as_str(),
                revision.record_count(),
            ],
        )?;
        tx.execute(
            "INSERT INTO payloads (revision_id, data) VALUES (?1, ?2)",
            params![revision.id().as_str(), payload],
        )?;
        tx.execute(REFRESH_METADATA, [])?;
        tx.commit()?;
        Ok(())
    }

    fn load_payload(&self, id: &RevisionId) -> Result<Option<Vec<u8>>, RevisionStoreError> {
        let connection = self.lock();
        let payload = connection
            .query_row(
                "SELECT data FROM payloads WHERE revision_id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn delete_revision(&self, id: &RevisionId) -> Result<bool, RevisionStoreError> {
        let mut connection = self.lock();
        let tx = connection.transaction()?;
        tx.execute("DELETE FROM payloads WHERE revision_id = ?1", [id.as_str()])?;
        let removed = tx.execute("DELETE FROM revisions WHERE id = ?1", [id.as_str()])?;
        tx.execute(REFRESH_METADATA, [])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn list_revisions(&self) -> Result<Vec<CacheRevision>, RevisionStoreError> {
        let connection = self.lock();
        let mut statement = connection.prepare(SELECT_REVISIONS)?;
        let mut rows = statement.query([])?;
        let mut revisions = Vec::new();
        while let Some(row) = rows.next()? {
            revisions.push(decode_revision(row)?);
        }
        Ok(revisions)
    }

    fn metadata(&self) -> Result<StoreMetadata, RevisionStoreError> {
        let connection = self.lock();
        let (total_size, revision_count, last_cleanup): (u64, u64, Option<i64>) = connection
            .query_row(
                "SELECT total_size, revision_count, last_cleanup FROM metadata WHERE id = 0",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
        Ok(StoreMetadata {
            total_size,
            revision_count,
            last_cleanup: last_cleanup.and_then(DateTime::from_timestamp_millis),
        })
    }

    fn record_cleanup(&self, at: DateTime<Utc>) -> Result<(), RevisionStoreError> {
        self.lock().execute(
            "UPDATE metadata SET last_cleanup = ?1 WHERE id = 0",
            [at.timestamp_millis()],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<(), RevisionStoreError> {
        let mut connection = self.lock();
        let tx = connection.transaction()?;
        tx.execute("DELETE FROM payloads", [])?;
        tx.execute("DELETE FROM revisions", [])?;
        tx.execute(REFRESH_METADATA, [])?;
        tx.commit()?;
        Ok(())
    }
}

fn decode_revision(row: &Row<'_>) -> Result<CacheRevision, RevisionStoreError> {
    let id: String = row.get(0)?;
    let invalid = |reason: String| RevisionStoreError::InvalidRow {
        id: id.clone(),
        reason,
    };

    let bbox = BoundingBox::new(row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)
        .map_err(|err| invalid(err.to_string()))?;
    let created_at = timestamp(row.get(5)?).ok_or_else(|| invalid("bad created_at".to_owned()))?;
    let expires_at = timestamp(row.get(6)?).ok_or_else(|| invalid("bad expires_at".to_owned()))?;
    let origin_name: String = row.get(10)?;
    let origin = OriginTag::from_name(&origin_name)
        .ok_or_else(|| invalid(format!("unknown origin {origin_name:?}")))?;

    Ok(CacheRevision::new(RevisionParts {
        id: RevisionId::new(id.clone()),
        bbox,
        created_at,
        expires_at,
        size_bytes: row.get(7)?,
        compressed: row.get(8)?,
        schema_version: row.get(9)?,
        origin,
        record_count: row.get(11)?,
    }))
}

fn timestamp(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{base_time, revision_at};
    use chrono::Duration;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn temp_db() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("cache.db");
        (dir, path)
    }

    #[rstest]
    fn revisions_survive_reopen(#[from(temp_db)] (_dir, path): (TempDir, std::path::PathBuf)) {
        let revision = revision_at("r1", [0.0, 0.0, 10.0, 10.0], 0, 60);
        {
            let store = SqliteRevisionStore::open(&path).expect("open store");
            store
                .put_revision(&revision, b"payload")
                .expect("write revision");
        }

        let reopened = SqliteRevisionStore::open(&path).expect("reopen store");
        assert_eq!(reopened.list_revisions().expect("list"), vec![revision.clone()]);
        assert_eq!(
            reopened.load_payload(revision.id()).expect("load"),
            Some(b"payload".to_vec())
        );
        let meta = reopened.metadata().expect("metadata");
        assert_eq!(meta.revision_count, 1);
        assert_eq!(meta.total_size, 7);
    }

    #[rstest]
    fn duplicate_write_leaves_original_intact() {
        let store = SqliteRevisionStore::open_in_memory().expect("open store");
        let revision = revision_at("r1", [0.0, 0.0, 1.0, 1.0], 0, 60);
        store.put_revision(&revision, b"first").expect("first write");
        let err = store
            .put_revision(&revision, b"second")
            .expect_err("duplicate should fail");
        assert!(matches!(err, RevisionStoreError::DuplicateRevision { .. }));
        assert_eq!(
            store.load_payload(revision.id()).expect("load"),
            Some(b"first".to_vec())
        );
        assert_eq!(store.metadata().expect("metadata").revision_count, 1);
    }

    #[rstest]
    fn delete_and_clear_update_metadata() {
        let store = SqliteRevisionStore::open_in_memory().expect("open store");
        for (id, offset) in [("a", 0), ("b", 1), ("c", 2)] {
            store
                .put_revision(&revision_at(id, [0.0, 0.0, 1.0, 1.0], offset, 60), b"xx")
                .expect("write");
        }
        assert!(store.delete_revision(&RevisionId::new("b")).expect("delete"));
        assert!(!store.delete_revision(&RevisionId::new("b")).expect("delete twice"));
        assert_eq!(store.metadata().expect("metadata").total_size, 4);

        let ids: Vec<_> = store
            .list_revisions()
            .expect("list")
            .iter()
            .map(|r| r.id().as_str().to_owned())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);

        store.clear().expect("clear");
        assert_eq!(store.metadata().expect("metadata").revision_count, 0);
        assert!(store.load_payload(&RevisionId::new("a")).expect("load").is_none());
    }

    #[rstest]
    fn cleanup_time_round_trips() {
        let store = SqliteRevisionStore::open_in_memory().expect("open store");
        let at = base_time() + Duration::minutes(5);
        store.record_cleanup(at).expect("record cleanup");
        assert_eq!(store.metadata().expect("metadata").last_cleanup, Some(at));
    }

    #[rstest]
    fn unknown_origin_is_reported() {
        let store = SqliteRevisionStore::open_in_memory().expect("open store");
        store
            .put_revision(&revision_at("r1", [0.0, 0.0, 1.0, 1.0], 0, 60), b"x")
            .expect("write");
        store
            .lock()
            .execute("UPDATE revisions SET origin = 'carrier-pigeon'", [])
            .expect("corrupt row");
        let err = store.list_revisions().expect_err("decode should fail");
        assert!(matches!(err, RevisionStoreError::InvalidRow { ref id, .. } if id == "r1"));
    }
}

//! `SqliteConnectionFactory`: the one `ConnectionFactory` implementation this crate
//! ships, backed by the fixed-width-parent-key-column schema described in `entries` below.

use async_trait::async_trait;
use cachekit_engine::connection_factory::{ConnectionFactory, StoredRow};
use cachekit_engine::error::{CacheError, CacheResult};
use cachekit_engine::item::CacheReadMode;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use std::time::Duration;
use tracing::instrument;

use crate::config::SqliteConfig;
use crate::pool::SqlitePool;

/// `ConnectionFactory` backed by SQLite via `tokio-rusqlite`. Owns its own connection
/// pool; `CacheEngine` asks it for work, never a raw connection.
pub struct SqliteConnectionFactory {
    pool: SqlitePool,
    max_parent_keys: usize,
}

impl SqliteConnectionFactory {
    /// Default column width, matching `Settings::default().max_parent_key_count_per_item`.
    pub const DEFAULT_MAX_PARENT_KEYS: usize = 5;

    /// Open (or create) the database described by `config`, with room for up to
    /// `max_parent_keys` parent-key edges per row. This bound is structural — it shapes
    /// the schema — and should match `Settings.max_parent_key_count_per_item`.
    pub async fn new(config: SqliteConfig, max_parent_keys: usize) -> CacheResult<Self> {
        let pool = SqlitePool::new(config).await.map_err(CacheError::from)?;
        Ok(Self { pool, max_parent_keys })
    }

    /// Open with the default parent-key column width.
    pub async fn with_defaults(config: SqliteConfig) -> CacheResult<Self> {
        Self::new(config, Self::DEFAULT_MAX_PARENT_KEYS).await
    }

    fn parent_key_columns(&self) -> Vec<String> {
        (0..self.max_parent_keys).map(|i| format!("parent_key_{i}")).collect()
    }

    /// The recursive-CTE delete statement used by both `cascade_dependents` and
    /// `remove_cascading`: everything transitively reachable from `?1`/`?2` through the
    /// parent-key columns, seeded from the removed row itself.
    fn cascade_sql(&self) -> String {
        let parent_columns = self.parent_key_columns();
        let seed_clause = parent_columns_or_clause("entries", &parent_columns, "?2");
        let recursive_clause = parent_columns_or_clause("e", &parent_columns, "d.key");
        format!(
            "WITH RECURSIVE dependents(partition, key) AS (
                SELECT partition, key FROM entries WHERE partition = ?1 AND ({seed_clause})
                UNION
                SELECT e.partition, e.key FROM entries e, dependents d
                WHERE e.partition = d.partition AND ({recursive_clause})
             )
             DELETE FROM entries WHERE (partition, key) IN (SELECT partition, key FROM dependents)"
        )
    }
}

fn to_epoch(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

fn row_from_sqlite(row: &rusqlite::Row<'_>, parent_columns: &[String]) -> rusqlite::Result<StoredRow> {
    let mut parent_keys = Vec::new();
    for i in 0..parent_columns.len() {
        let value: Option<String> = row.get(8 + i)?;
        if let Some(key) = value {
            parent_keys.push(key);
        }
    }
    let tamper_idx = 8 + parent_columns.len();
    Ok(StoredRow {
        partition: row.get(0)?,
        key: row.get(1)?,
        utc_creation: from_epoch(row.get(2)?),
        utc_expiry: from_epoch(row.get(3)?),
        interval: Duration::from_secs(row.get::<_, i64>(4)?.max(0) as u64),
        value_bytes: row.get(5)?,
        compressed: row.get::<_, i64>(6)? != 0,
        value_kind: row.get(7)?,
        parent_keys,
        tamper_hash: row.get::<_, i64>(tamper_idx)? as u64,
    })
}

const SELECT_COLUMNS_PREFIX: &str =
    "partition, key, utc_creation, utc_expiry, interval_seconds, value_bytes, compressed, value_kind";

/// An `OR`-chain over every parent-key column, substituting `placeholder` for the
/// value each column is compared against. Evaluates to `1=0` when there are no parent
/// columns at all, so a cascade on a schema with no parent-key slots deletes nothing.
fn parent_columns_or_clause(table_prefix: &str, columns: &[String], placeholder: &str) -> String {
    if columns.is_empty() {
        return "1=0".to_string();
    }
    columns
        .iter()
        .map(|c| format!("{table_prefix}.{c} = {placeholder}"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[async_trait]
impl ConnectionFactory for SqliteConnectionFactory {
    #[instrument(skip(self))]
    async fn ensure_schema(&self) -> CacheResult<()> {
        let parent_columns = self.parent_key_columns();
        let parent_column_defs: String =
            parent_columns.iter().map(|c| format!("{c} TEXT,")).collect();

        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS entries (
                partition TEXT NOT NULL,
                key TEXT NOT NULL,
                utc_creation INTEGER NOT NULL,
                utc_expiry INTEGER NOT NULL,
                interval_seconds INTEGER NOT NULL,
                value_bytes BLOB NOT NULL,
                compressed INTEGER NOT NULL,
                value_kind TEXT NOT NULL DEFAULT '',
                {parent_column_defs}
                tamper_hash INTEGER NOT NULL,
                PRIMARY KEY (partition, key)
            )"
        );

        let conn = self.pool.get().await.map_err(CacheError::from)?;
        conn.execute_batch(&create_table).await.map_err(CacheError::from)?;
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_entries_partition_expiry ON entries(partition, utc_expiry);",
        )
        .await
        .map_err(CacheError::from)?;
        for column in &parent_columns {
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS idx_entries_{column} ON entries(partition, {column});"
            );
            conn.execute_batch(&sql).await.map_err(CacheError::from)?;
        }
        Ok(())
    }

    #[instrument(skip(self, row), fields(partition = %row.partition, key = %row.key))]
    async fn upsert(&self, row: &StoredRow) -> CacheResult<()> {
        let parent_columns = self.parent_key_columns();
        if row.parent_keys.len() > parent_columns.len() {
            return Err(CacheError::invalid_argument(format!(
                "{} parent keys exceeds the schema's column width ({})",
                row.parent_keys.len(),
                parent_columns.len()
            )));
        }

        let column_list: String = parent_columns.iter().cloned().collect::<Vec<_>>().join(", ");
        let value_placeholders: Vec<String> =
            (0..parent_columns.len()).map(|i| format!("?{}", 9 + i)).collect();
        let update_assignments: String = parent_columns
            .iter()
            .map(|c| format!(", {c} = excluded.{c}"))
            .collect();
        let sql = format!(
            "INSERT INTO entries (partition, key, utc_creation, utc_expiry, interval_seconds,
                value_bytes, compressed, value_kind, {column_list}{comma}tamper_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, {value_list}{comma}?{hash_idx})
             ON CONFLICT(partition, key) DO UPDATE SET
                utc_creation = excluded.utc_creation,
                utc_expiry = excluded.utc_expiry,
                interval_seconds = excluded.interval_seconds,
                value_bytes = excluded.value_bytes,
                compressed = excluded.compressed,
                value_kind = excluded.value_kind,
                tamper_hash = excluded.tamper_hash{update_assignments}",
            comma = if parent_columns.is_empty() { "" } else { ", " },
            value_list = value_placeholders.join(", "),
            hash_idx = 9 + parent_columns.len(),
        );

        let partition = row.partition.clone();
        let key = row.key.clone();
        let utc_creation = to_epoch(row.utc_creation);
        let utc_expiry = to_epoch(row.utc_expiry);
        let interval_secs = row.interval.as_secs() as i64;
        let value_bytes = row.value_bytes.clone();
        let compressed = row.compressed as i64;
        let value_kind = row.value_kind.clone();
        let tamper_hash = row.tamper_hash as i64;
        let mut parent_values: Vec<Option<String>> = row.parent_keys.iter().cloned().map(Some).collect();
        parent_values.resize(parent_columns.len(), None);

        let conn = self.pool.get().await.map_err(CacheError::from)?;
        conn.call(move |conn| {
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![
                Box::new(partition),
                Box::new(key),
                Box::new(utc_creation),
                Box::new(utc_expiry),
                Box::new(interval_secs),
                Box::new(value_bytes),
                Box::new(compressed),
                Box::new(value_kind),
            ];
            for value in parent_values {
                params.push(Box::new(value));
            }
            params.push(Box::new(tamper_hash));
            let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
            conn.execute(&sql, refs.as_slice())?;
            Ok(())
        })
        .await
        .map_err(CacheError::from)
    }

    #[instrument(skip(self), fields(partition = %partition, key = %key))]
    async fn select_live(
        &self,
        partition: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> CacheResult<Option<StoredRow>> {
        let parent_columns = self.parent_key_columns();
        let select_cols = select_columns(&parent_columns);
        let sql = format!(
            "UPDATE entries SET utc_expiry = CASE WHEN interval_seconds > 0 THEN ?3 + interval_seconds ELSE utc_expiry END
             WHERE partition = ?1 AND key = ?2 AND utc_expiry >= ?3
             RETURNING {select_cols}"
        );
        let partition = partition.to_string();
        let key = key.to_string();
        let now_epoch = to_epoch(now);
        let columns = parent_columns.clone();
        self.pool
            .get()
            .await
            .map_err(CacheError::from)?
            .call(move |conn| {
                conn.query_row(&sql, rusqlite::params![partition, key, now_epoch], |row| {
                    row_from_sqlite(row, &columns)
                })
                .optional()
            })
            .await
            .map_err(CacheError::from)
    }

    #[instrument(skip(self), fields(partition = %partition, key = %key))]
    async fn peek(
        &self,
        partition: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> CacheResult<Option<StoredRow>> {
        let parent_columns = self.parent_key_columns();
        let select_cols = select_columns(&parent_columns);
        let sql = format!(
            "SELECT {select_cols} FROM entries WHERE partition = ?1 AND key = ?2 AND utc_expiry >= ?3"
        );
        let partition = partition.to_string();
        let key = key.to_string();
        let now_epoch = to_epoch(now);
        let columns = parent_columns.clone();
        self.pool
            .get()
            .await
            .map_err(CacheError::from)?
            .call(move |conn| {
                conn.query_row(&sql, rusqlite::params![partition, key, now_epoch], |row| {
                    row_from_sqlite(row, &columns)
                })
                .optional()
            })
            .await
            .map_err(CacheError::from)
    }

    async fn contains(&self, partition: &str, key: &str, now: DateTime<Utc>) -> CacheResult<bool> {
        let partition = partition.to_string();
        let key = key.to_string();
        let now_epoch = to_epoch(now);
        self.pool
            .get()
            .await
            .map_err(CacheError::from)?
            .call(move |conn| {
                conn.query_row(
                    "SELECT 1 FROM entries WHERE partition = ?1 AND key = ?2 AND utc_expiry >= ?3",
                    rusqlite::params![partition, key, now_epoch],
                    |_| Ok(()),
                )
                .optional()
                .map(|found| found.is_some())
            })
            .await
            .map_err(CacheError::from)
    }

    #[instrument(skip(self), fields(partition = %partition, key = %key))]
    async fn delete(&self, partition: &str, key: &str) -> CacheResult<bool> {
        let partition = partition.to_string();
        let key = key.to_string();
        self.pool
            .get()
            .await
            .map_err(CacheError::from)?
            .call(move |conn| {
                let affected = conn.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND key = ?2",
                    rusqlite::params![partition, key],
                )?;
                Ok(affected > 0)
            })
            .await
            .map_err(CacheError::from)
    }

    #[instrument(skip(self), fields(partition = %partition, key = %key))]
    async fn cascade_dependents(&self, partition: &str, key: &str) -> CacheResult<u64> {
        let sql = self.cascade_sql();
        let partition = partition.to_string();
        let key = key.to_string();
        self.pool
            .get()
            .await
            .map_err(CacheError::from)?
            .call(move |conn| {
                let affected = conn.execute(&sql, rusqlite::params![partition, key])?;
                Ok(affected as u64)
            })
            .await
            .map_err(CacheError::from)
    }

    #[instrument(skip(self), fields(partition = %partition, key = %key))]
    async fn remove_cascading(&self, partition: &str, key: &str) -> CacheResult<(bool, u64)> {
        let cascade_sql = self.cascade_sql();
        let partition = partition.to_string();
        let key = key.to_string();
        self.pool
            .get()
            .await
            .map_err(CacheError::from)?
            .call(move |conn| {
                let tx = conn.unchecked_transaction()?;
                let removed = tx.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND key = ?2",
                    rusqlite::params![partition, key],
                )? > 0;
                let cascaded = if removed {
                    tx.execute(&cascade_sql, rusqlite::params![partition, key])? as u64
                } else {
                    0
                };
                tx.commit()?;
                Ok((removed, cascaded))
            })
            .await
            .map_err(CacheError::from)
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<u64> {
        let now_epoch = to_epoch(now);
        self.pool
            .get()
            .await
            .map_err(CacheError::from)?
            .call(move |conn| {
                let affected =
                    conn.execute("DELETE FROM entries WHERE utc_expiry < ?1", rusqlite::params![now_epoch])?;
                Ok(affected as u64)
            })
            .await
            .map_err(CacheError::from)
    }

    async fn clear(
        &self,
        partition: Option<&str>,
        mode: CacheReadMode,
        now: DateTime<Utc>,
    ) -> CacheResult<u64> {
        let now_epoch = to_epoch(now);
        let partition = partition.map(str::to_string);
        self.pool
            .get()
            .await
            .map_err(CacheError::from)?
            .call(move |conn| {
                let affected = match (partition, mode) {
                    (Some(p), CacheReadMode::IgnoreExpiryDate) => {
                        conn.execute("DELETE FROM entries WHERE partition = ?1", rusqlite::params![p])?
                    }
                    (None, CacheReadMode::IgnoreExpiryDate) => conn.execute("DELETE FROM entries", [])?,
                    (Some(p), CacheReadMode::ConsiderExpiryDate) => conn.execute(
                        "DELETE FROM entries WHERE partition = ?1 AND utc_expiry < ?2",
                        rusqlite::params![p, now_epoch],
                    )?,
                    (None, CacheReadMode::ConsiderExpiryDate) => {
                        conn.execute("DELETE FROM entries WHERE utc_expiry < ?1", rusqlite::params![now_epoch])?
                    }
                };
                Ok(affected as u64)
            })
            .await
            .map_err(CacheError::from)
    }

    async fn count(
        &self,
        partition: Option<&str>,
        mode: CacheReadMode,
        now: DateTime<Utc>,
    ) -> CacheResult<u64> {
        let now_epoch = to_epoch(now);
        let partition = partition.map(str::to_string);
        self.pool
            .get()
            .await
            .map_err(CacheError::from)?
            .call(move |conn| {
                let count: i64 = match (partition, mode) {
                    (Some(p), CacheReadMode::IgnoreExpiryDate) => conn.query_row(
                        "SELECT COUNT(*) FROM entries WHERE partition = ?1",
                        rusqlite::params![p],
                        |row| row.get(0),
                    )?,
                    (None, CacheReadMode::IgnoreExpiryDate) => {
                        conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?
                    }
                    (Some(p), CacheReadMode::ConsiderExpiryDate) => conn.query_row(
                        "SELECT COUNT(*) FROM entries WHERE partition = ?1 AND utc_expiry >= ?2",
                        rusqlite::params![p, now_epoch],
                        |row| row.get(0),
                    )?,
                    (None, CacheReadMode::ConsiderExpiryDate) => conn.query_row(
                        "SELECT COUNT(*) FROM entries WHERE utc_expiry >= ?1",
                        rusqlite::params![now_epoch],
                        |row| row.get(0),
                    )?,
                };
                Ok(count.max(0) as u64)
            })
            .await
            .map_err(CacheError::from)
    }

    async fn list_live(&self, partition: Option<&str>, now: DateTime<Utc>) -> CacheResult<Vec<StoredRow>> {
        let parent_columns = self.parent_key_columns();
        let select_cols = select_columns(&parent_columns);
        let now_epoch = to_epoch(now);
        let partition = partition.map(str::to_string);
        let columns = parent_columns.clone();
        self.pool
            .get()
            .await
            .map_err(CacheError::from)?
            .call(move |conn| match partition {
                Some(p) => {
                    let sql = format!(
                        "SELECT {select_cols} FROM entries WHERE partition = ?1 AND utc_expiry >= ?2"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(rusqlite::params![p, now_epoch], |row| row_from_sqlite(row, &columns))?
                        .collect()
                }
                None => {
                    let sql = format!("SELECT {select_cols} FROM entries WHERE utc_expiry >= ?1");
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(rusqlite::params![now_epoch], |row| row_from_sqlite(row, &columns))?
                        .collect()
                }
            })
            .await
            .map_err(CacheError::from)
    }

    async fn size_in_bytes(&self) -> CacheResult<u64> {
        self.pool
            .get()
            .await
            .map_err(CacheError::from)?
            .call(move |conn| {
                let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
                let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
                Ok((page_count * page_size).max(0) as u64)
            })
            .await
            .map_err(CacheError::from)
    }
}

fn select_columns(parent_columns: &[String]) -> String {
    if parent_columns.is_empty() {
        format!("{SELECT_COLUMNS_PREFIX}, tamper_hash")
    } else {
        format!("{SELECT_COLUMNS_PREFIX}, {}, tamper_hash", parent_columns.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    async fn factory() -> SqliteConnectionFactory {
        let factory = SqliteConnectionFactory::with_defaults(SqliteConfig::memory())
            .await
            .expect("open in-memory db");
        factory.ensure_schema().await.expect("create schema");
        factory
    }

    fn row(partition: &str, key: &str, now: DateTime<Utc>) -> StoredRow {
        StoredRow {
            partition: partition.to_string(),
            key: key.to_string(),
            utc_creation: now,
            utc_expiry: now + chrono::Duration::seconds(60),
            interval: StdDuration::from_secs(0),
            value_bytes: b"payload".to_vec(),
            compressed: false,
            value_kind: "json".to_string(),
            parent_keys: Vec::new(),
            tamper_hash: 42,
        }
    }

    #[tokio::test]
    async fn upsert_then_peek_round_trips() {
        let factory = factory().await;
        let now = Utc::now();
        factory.upsert(&row("users", "1", now)).await.unwrap();

        let found = factory.peek("users", "1", now).await.unwrap().expect("row present");
        assert_eq!(found.value_bytes, b"payload");
        assert_eq!(found.tamper_hash, 42);
    }

    #[tokio::test]
    async fn select_live_extends_sliding_expiry() {
        let factory = factory().await;
        let now = Utc::now();
        let mut stored = row("users", "1", now);
        stored.interval = StdDuration::from_secs(60);
        stored.utc_expiry = now + chrono::Duration::seconds(60);
        factory.upsert(&stored).await.unwrap();

        let later = now + chrono::Duration::seconds(30);
        let extended = factory.select_live("users", "1", later).await.unwrap().expect("still live");
        assert!(extended.utc_expiry > stored.utc_expiry);

        // peek does not extend
        let peeked_before = factory.peek("users", "1", later).await.unwrap().expect("still live");
        assert_eq!(peeked_before.utc_expiry, extended.utc_expiry);
    }

    #[tokio::test]
    async fn expired_rows_are_invisible_to_reads() {
        let factory = factory().await;
        let now = Utc::now();
        let mut stored = row("users", "1", now);
        stored.utc_expiry = now - chrono::Duration::seconds(1);
        factory.upsert(&stored).await.unwrap();

        assert!(factory.peek("users", "1", now).await.unwrap().is_none());
        assert!(!factory.contains("users", "1", now).await.unwrap());
    }

    #[tokio::test]
    async fn cascade_dependents_removes_transitive_children() {
        let factory = factory().await;
        let now = Utc::now();
        let mut parent = row("p", "root", now);
        parent.key = "root".to_string();
        factory.upsert(&parent).await.unwrap();

        let mut child = row("p", "child", now);
        child.parent_keys = vec!["root".to_string()];
        factory.upsert(&child).await.unwrap();

        let mut grandchild = row("p", "grandchild", now);
        grandchild.parent_keys = vec!["child".to_string()];
        factory.upsert(&grandchild).await.unwrap();

        let removed = factory.cascade_dependents("p", "root").await.unwrap();
        assert_eq!(removed, 2);
        assert!(!factory.contains("p", "child", now).await.unwrap());
        assert!(!factory.contains("p", "grandchild", now).await.unwrap());
    }

    #[tokio::test]
    async fn remove_cascading_deletes_the_row_and_its_dependents_together() {
        let factory = factory().await;
        let now = Utc::now();
        let mut parent = row("p", "root", now);
        parent.key = "root".to_string();
        factory.upsert(&parent).await.unwrap();

        let mut child = row("p", "child", now);
        child.parent_keys = vec!["root".to_string()];
        factory.upsert(&child).await.unwrap();

        let (removed, cascaded) = factory.remove_cascading("p", "root").await.unwrap();
        assert!(removed);
        assert_eq!(cascaded, 1);
        assert!(!factory.contains("p", "root", now).await.unwrap());
        assert!(!factory.contains("p", "child", now).await.unwrap());
    }

    #[tokio::test]
    async fn remove_cascading_on_an_absent_key_reports_no_removal_and_no_cascade() {
        let factory = factory().await;
        let (removed, cascaded) = factory.remove_cascading("p", "nobody").await.unwrap();
        assert!(!removed);
        assert_eq!(cascaded, 0);
    }

    #[tokio::test]
    async fn clear_respects_partition_and_mode() {
        let factory = factory().await;
        let now = Utc::now();
        factory.upsert(&row("a", "1", now)).await.unwrap();
        factory.upsert(&row("b", "1", now)).await.unwrap();

        let removed = factory.clear(Some("a"), CacheReadMode::IgnoreExpiryDate, now).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(factory.count(None, CacheReadMode::IgnoreExpiryDate, now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sliding_entry_survives_tamper_check_after_expiry_extension() {
        use cachekit_engine::clock::FixedClock;
        use cachekit_engine::random::FixedRandom;
        use cachekit_engine::{CacheEngine, CacheRead, Expiration, Settings};
        use std::sync::Arc;
        use tokio_util::sync::CancellationToken;

        let factory = SqliteConnectionFactory::with_defaults(SqliteConfig::memory())
            .await
            .expect("open in-memory db");
        let clock = FixedClock::new(Utc::now());
        let engine = CacheEngine::with_capabilities(
            factory,
            cachekit_engine::JsonSerializer,
            cachekit_engine::ZstdCompressor::new(),
            Arc::new(clock.clone()),
            Arc::new(FixedRandom(0)),
            Settings::default(),
        )
        .await
        .expect("build engine");

        let cancel = CancellationToken::new();
        engine
            .add(
                "users",
                "1",
                &"payload".to_string(),
                Expiration::Sliding { interval: StdDuration::from_secs(60) },
                Vec::new(),
                &cancel,
            )
            .await
            .unwrap();

        // a read partway through the window extends utc_expiry; the row must still
        // verify against its tamper hash and come back Present, not Absent.
        clock.advance(chrono::Duration::seconds(30));
        let read = engine.get::<String>("users", "1", &cancel).await.unwrap();
        assert!(matches!(read, CacheRead::Present(ref value) if value == "payload"));
        assert!(engine.last_error().is_none());
    }

    #[tokio::test]
    async fn add_rejects_a_parent_key_that_names_no_live_entry() {
        use cachekit_engine::{CacheEngine, CacheError, Expiration, Settings};
        use tokio_util::sync::CancellationToken;

        let factory = SqliteConnectionFactory::with_defaults(SqliteConfig::memory())
            .await
            .expect("open in-memory db");
        let engine = CacheEngine::new(factory, Settings::default()).await.expect("build engine");
        let cancel = CancellationToken::new();

        let err = engine
            .add(
                "users",
                "child",
                &"payload".to_string(),
                Expiration::Timed { utc_expiry: Utc::now() + chrono::Duration::seconds(60) },
                vec!["missing-parent".to_string()],
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn add_accepts_a_parent_key_that_names_a_live_entry() {
        use cachekit_engine::{CacheEngine, Expiration, Settings};
        use tokio_util::sync::CancellationToken;

        let factory = SqliteConnectionFactory::with_defaults(SqliteConfig::memory())
            .await
            .expect("open in-memory db");
        let engine = CacheEngine::new(factory, Settings::default()).await.expect("build engine");
        let cancel = CancellationToken::new();

        engine
            .add(
                "users",
                "parent",
                &"payload".to_string(),
                Expiration::Timed { utc_expiry: Utc::now() + chrono::Duration::seconds(60) },
                Vec::new(),
                &cancel,
            )
            .await
            .unwrap();

        engine
            .add(
                "users",
                "child",
                &"payload".to_string(),
                Expiration::Timed { utc_expiry: Utc::now() + chrono::Duration::seconds(60) },
                vec!["parent".to_string()],
                &cancel,
            )
            .await
            .expect("parent is live, add should succeed");
    }

    #[tokio::test]
    async fn purge_expired_removes_only_past_rows() {
        let factory = factory().await;
        let now = Utc::now();
        let mut live = row("p", "live", now);
        live.utc_expiry = now + chrono::Duration::seconds(60);
        let mut dead = row("p", "dead", now);
        dead.utc_expiry = now - chrono::Duration::seconds(60);
        factory.upsert(&live).await.unwrap();
        factory.upsert(&dead).await.unwrap();

        let purged = factory.purge_expired(now).await.unwrap();
        assert_eq!(purged, 1);
        assert!(factory.peek("p", "live", now).await.unwrap().is_some());
    }
}

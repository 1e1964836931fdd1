use anyhow::Context;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::now_ms;

/// Fixed keys the session reads and writes.
pub mod keys {
    pub const POSITIONS: &str = "warboard.positions";
    pub const PLAYERS: &str = "warboard.players";
    pub const TEAM_NAMES: &str = "warboard.team-names";
    pub const THEME: &str = "warboard.theme";
}

/// String-keyed durable store holding JSON text.
pub trait KvStore: Send + std::fmt::Debug {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;
    /// Monotonic write counter; the UI polls it to notice changes.
    fn revision(&self) -> anyhow::Result<i64>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.db_path.clone();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        migrate(&conn)?;
        Ok(conn)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.open()?;
        conn.query_row("SELECT value_json FROM kv WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()
        .with_context(|| format!("read key {key}"))
    }

    fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let ts = now_ms();
        tx.execute(
            "INSERT INTO kv (key, value_json, updated_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at_ms = excluded.updated_at_ms",
            (key, value, ts),
        )
        .with_context(|| format!("write key {key}"))?;
        append_event_tx(&tx, "kv.put", key, value.len())?;
        tx.commit()?;
        Ok(())
    }

    fn revision(&self) -> anyhow::Result<i64> {
        let conn = self.open()?;
        let rev: Option<i64> =
            conn.query_row("SELECT MAX(seq) FROM event_log", [], |row| row.get(0))?;
        Ok(rev.unwrap_or(0))
    }
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if v < 1 {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value_json TEXT NOT NULL,
  updated_at_ms INTEGER NOT NULL
);

-- Monotonic revision source for UI sync.
CREATE TABLE IF NOT EXISTS event_log (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  kind TEXT NOT NULL,
  key TEXT NOT NULL,
  bytes INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_event_log_ts ON event_log(ts_ms);
"#,
        )?;

        conn.pragma_update(None, "user_version", 1_i64)?;
    }

    Ok(())
}

fn append_event_tx(
    tx: &rusqlite::Transaction<'_>,
    kind: &str,
    key: &str,
    bytes: usize,
) -> anyhow::Result<i64> {
    let ts = now_ms();
    let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
    tx.execute(
        "INSERT INTO event_log (ts_ms, kind, key, bytes) VALUES (?1, ?2, ?3, ?4)",
        (ts, kind, key, bytes),
    )?;
    Ok(tx.last_insert_rowid())
}

/// In-process store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: BTreeMap<String, String>,
    rev: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.lock()?.values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        inner.values.insert(key.to_string(), value.to_string());
        inner.rev += 1;
        Ok(())
    }

    fn revision(&self) -> anyhow::Result<i64> {
        Ok(self.lock()?.rev)
    }
}

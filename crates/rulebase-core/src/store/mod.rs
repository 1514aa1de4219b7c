//! SQLite-backed record store.
//!
//! The store owns a small pool of connections and executes the statements
//! produced by the query builder. Every statement is a single parameterized
//! statement; parameters are bound by name, and parameters that the rendered
//! SQL does not reference are skipped.

mod row;

use crate::catalog::Collection;
use crate::error::{Error, Result};
use crate::query::{quote_ident, SelectQuery};
use crate::record::{Record, Value};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, Statement};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Database file; `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Number of pooled connections (in-memory stores always use one).
    pub max_connections: usize,
    /// How long a connection waits on a locked database.
    #[serde(with = "millis")]
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Pooled SQLite record store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    slots: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("connections", &self.inner.slots.len())
            .finish()
    }
}

impl Store {
    /// Open the store described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let slots = match &config.path {
            None => vec![Mutex::new(open_connection(None, config.busy_timeout)?)],
            Some(path) => (0..config.max_connections.max(1))
                .map(|_| open_connection(Some(path), config.busy_timeout).map(Mutex::new))
                .collect::<Result<Vec<_>>>()?,
        };
        debug!(connections = slots.len(), path = ?config.path, "opened store");

        Ok(Self {
            inner: Arc::new(StoreInner {
                slots,
                next: AtomicUsize::new(0),
            }),
        })
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    /// Acquire a connection, preferring an idle slot.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        let slots = &self.inner.slots;
        let start = self.inner.next.fetch_add(1, Ordering::Relaxed) % slots.len();
        for i in 0..slots.len() {
            if let Some(guard) = slots[(start + i) % slots.len()].try_lock() {
                return guard;
            }
        }
        slots[start].lock()
    }

    /// Create the collection table if it does not exist and add missing
    /// columns.
    pub fn sync_collection(&self, collection: &Collection) -> Result<()> {
        let conn = self.connection();
        let table = quote_ident(&collection.name);

        let columns: Vec<String> = collection
            .fields
            .iter()
            .map(|f| f.column_definition())
            .collect();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            table,
            columns.join(", ")
        ))?;

        let existing: Vec<String> = {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
            let names = stmt.query_map([], |row| row.get::<_, String>("name"))?;
            names.collect::<rusqlite::Result<_>>()?
        };
        for field in &collection.fields {
            if !existing.iter().any(|c| c == &field.name) {
                conn.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    table,
                    field.column_definition()
                ))?;
            }
        }

        debug!(collection_id = %collection.id, table = %collection.name, "synced collection table");
        Ok(())
    }

    /// Execute a records query and decode every row.
    pub fn find_records(&self, collection: &Arc<Collection>, query: &SelectQuery) -> Result<Vec<Record>> {
        let sql = query.build();
        debug!(collection_id = %collection.id, sql = %sql, "find records");

        let conn = self.connection();
        let mut stmt = conn.prepare(&sql)?;
        bind_params(&mut stmt, query.params())?;

        let mut rows = stmt.raw_query();
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row::decode_record(collection, row)?);
        }
        Ok(records)
    }

    /// First record matched by `query`, if any.
    pub fn find_one(&self, collection: &Arc<Collection>, query: &SelectQuery) -> Result<Option<Record>> {
        let mut query = query.clone();
        query.limit(1);
        Ok(self.find_records(collection, &query)?.into_iter().next())
    }

    /// Record with the given id that also satisfies the predicates already
    /// in `query` (typically a rule filter). Missing and filtered-out rows
    /// are both [`Error::NotFound`].
    pub fn find_record_by_id(
        &self,
        collection: &Arc<Collection>,
        id: &str,
        query: &SelectQuery,
    ) -> Result<Record> {
        let mut query = query.clone();
        let alias = query
            .base_alias()
            .unwrap_or(collection.name.as_str())
            .to_string();
        query.where_id(&alias, id);
        self.find_one(collection, &query)?.ok_or(Error::NotFound)
    }

    /// Whether `query` yields at least one row.
    pub fn exists(&self, query: &SelectQuery) -> Result<bool> {
        let sql = query.build();
        debug!(sql = %sql, "exists");

        let conn = self.connection();
        let mut stmt = conn.prepare(&sql)?;
        bind_params(&mut stmt, query.params())?;
        let mut rows = stmt.raw_query();
        let found = rows.next()?.is_some();
        Ok(found)
    }

    /// Number of distinct base rows matched by `query`, ignoring paging.
    pub fn count(&self, query: &SelectQuery) -> Result<u64> {
        let sql = query.build_count();
        debug!(sql = %sql, "count");

        let conn = self.connection();
        let mut stmt = conn.prepare(&sql)?;
        bind_params(&mut stmt, query.params())?;
        let mut rows = stmt.raw_query();
        let count: i64 = match rows.next()? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    /// Insert a new row with every schema field of `record`.
    pub fn insert(&self, record: &Record) -> Result<()> {
        let collection = record.collection();
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        let mut params = Vec::new();
        for (i, (field, value)) in record.fields().enumerate() {
            columns.push(quote_ident(&field.name));
            placeholders.push(format!(":c{}", i));
            params.push((format!("c{}", i), value.clone()));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&collection.name),
            columns.join(", "),
            placeholders.join(", ")
        );
        self.execute(&sql, &params, collection)?;
        Ok(())
    }

    /// Overwrite every non-id column of the row identified by the record id.
    pub fn update(&self, record: &Record) -> Result<()> {
        let collection = record.collection();
        let mut assignments = Vec::new();
        let mut params = vec![("id".to_string(), Value::Text(record.id().to_string()))];
        for (i, (field, value)) in record.fields().enumerate() {
            if field.name == "id" {
                continue;
            }
            assignments.push(format!("{} = :c{}", quote_ident(&field.name), i));
            params.push((format!("c{}", i), value.clone()));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE \"id\" = :id",
            quote_ident(&collection.name),
            assignments.join(", ")
        );
        if self.execute(&sql, &params, collection)? == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    /// Delete the row identified by the record id.
    pub fn delete(&self, record: &Record) -> Result<()> {
        let collection = record.collection();
        let sql = format!("DELETE FROM {} WHERE \"id\" = :id", quote_ident(&collection.name));
        let params = [("id".to_string(), Value::Text(record.id().to_string()))];
        if self.execute(&sql, &params, collection)? == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    /// Run a write statement and return the number of changed rows.
    fn execute(&self, sql: &str, params: &[(String, Value)], collection: &Collection) -> Result<usize> {
        debug!(collection_id = %collection.id, sql = %sql, "execute");
        let conn = self.connection();
        let mut stmt = conn.prepare(sql)?;
        bind_params(&mut stmt, params)?;
        Ok(stmt.raw_execute()?)
    }
}

fn open_connection(path: Option<&PathBuf>, busy_timeout: Duration) -> Result<Connection> {
    let conn = match path {
        Some(path) => {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
                    | OpenFlags::SQLITE_OPEN_URI,
            )?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
            conn
        }
        None => Connection::open_in_memory()?,
    };
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

/// Bind every parameter the statement references; others are ignored.
fn bind_params(stmt: &mut Statement<'_>, params: &[(String, Value)]) -> Result<()> {
    for (name, value) in params {
        if let Some(index) = stmt.parameter_index(&format!(":{}", name))? {
            stmt.raw_bind_parameter(index, value)?;
        }
    }
    Ok(())
}

//! Embedded `SQLite` cache provider
//!
//! A lightweight [`CacheProvider`] for development and tests. Every cache
//! name resolves to the same connection.

#![allow(clippy::significant_drop_tightening)]

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use fromenv::FromEnv;
use kiln_orm::{Cache, CacheProvider, Cursor, Value};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use tracing::instrument;

/// Options used to open the database.
#[derive(Debug, Clone, FromEnv)]
pub struct ConnectOptions {
    /// Database path or URI.
    #[env(from = "SQL_DATABASE", default = "file::memory:?cache=shared")]
    pub database: String,
}

impl ConnectOptions {
    /// Loads the options from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable cannot be read.
    pub fn load() -> Result<Self> {
        Self::from_env().finalize().context("issue loading connection options")
    }
}

/// Hands out caches backed by a single `SQLite` connection.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    // rusqlite::Connection isn't `Sync`
    conn: Arc<parking_lot::Mutex<Connection>>,
}

impl SqliteProvider {
    /// Opens the database named by `SQL_DATABASE`.
    ///
    /// # Errors
    ///
    /// Returns an error when the options cannot be loaded or the database
    /// cannot be opened.
    pub fn connect() -> Result<Self> {
        Self::connect_with(ConnectOptions::load()?)
    }

    /// Opens the database named by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error when the database cannot be opened.
    #[instrument]
    pub fn connect_with(options: ConnectOptions) -> Result<Self> {
        tracing::debug!("initializing SQLite connection to: {}", options.database);
        let conn = Connection::open(&options.database).context("failed to open SQLite database")?;
        Ok(Self {
            conn: Arc::new(parking_lot::Mutex::new(conn)),
        })
    }
}

impl CacheProvider for SqliteProvider {
    fn cache(&self, name: &str) -> Result<Arc<dyn Cache>> {
        tracing::debug!(cache = name, "opening SQLite cache");
        Ok(Arc::new(SqliteCache {
            conn: Arc::clone(&self.conn),
        }))
    }
}

#[derive(Debug)]
struct SqliteCache {
    conn: Arc<parking_lot::Mutex<Connection>>,
}

impl Cache for SqliteCache {
    fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Cursor>> {
        tracing::debug!("executing query: {sql}");
        let params = args.iter().map(to_sqlite).collect::<Result<Vec<_>>>()?;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;
        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();

        let mut rows = stmt.query(params_from_iter(params.iter())).context("failed to execute query")?;
        let mut buffered = Vec::new();
        while let Some(row) = rows.next().context("failed to fetch row")? {
            let mut cells = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let cell = row.get_ref(i).context("failed to get column value")?;
                cells.push(from_sqlite(cell)?);
            }
            buffered.push(cells);
        }

        Ok(Box::new(RowCursor {
            columns,
            rows: buffered.into_iter(),
        }))
    }

    fn execute(&self, sql: &str, args: &[Value]) -> Result<u64> {
        tracing::debug!("executing statement: {sql}");
        let params = args.iter().map(to_sqlite).collect::<Result<Vec<_>>>()?;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;
        let changed =
            stmt.execute(params_from_iter(params.iter())).context("failed to execute statement")?;
        Ok(changed as u64)
    }
}

/// Rows are read eagerly, so the connection is released before the caller
/// starts iterating.
struct RowCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl Iterator for RowCursor {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(Ok)
    }
}

impl Cursor for RowCursor {
    fn column_names(&self) -> &[String] {
        &self.columns
    }
}

fn to_sqlite(value: &Value) -> Result<SqliteValue> {
    let converted = match value {
        Value::Null => SqliteValue::Null,
        Value::Boolean(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(i64::from(*i)),
        Value::Long(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(f64::from(*f)),
        Value::Double(f) => SqliteValue::Real(*f),
        Value::Decimal(s) | Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Uuid(id) => SqliteValue::Text(id.hyphenated().to_string()),
        Value::Timestamp(ts) => SqliteValue::Text(ts.to_rfc3339()),
        Value::Date(date) => SqliteValue::Text(date.format("%Y-%m-%d").to_string()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::List(_) | Value::Object(_) => {
            bail!("cannot bind {value:?} to a single SQLite parameter")
        }
    };
    Ok(converted)
}

fn from_sqlite(value: ValueRef<'_>) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Long(i)),
        ValueRef::Real(f) => Ok(Value::Double(f)),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).context("invalid UTF-8 in text value")?;
            Ok(Value::String(s.to_string()))
        }
        ValueRef::Blob(b) => Ok(Value::Bytes(b.to_vec())),
    }
}

//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use kiln_orm::{
    Association, AssociationKind, AutoPopulated, Cache, CacheProvider, Clock, Cursor, DataType,
    Entity, EntityRef, PersistentEntity, PersistentProperty, Value,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Common test entities used across multiple test files

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub total_pages: i32,
}

impl Entity for Book {
    fn describe() -> PersistentEntity {
        PersistentEntity::new("Book")
            .with_schema("mydb")
            .with_identity(PersistentProperty::new("id", DataType::Long))
            .with_property(PersistentProperty::new("title", DataType::String))
            .with_property(PersistentProperty::new("totalPages", DataType::Integer))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: Option<Uuid>,
    pub name: String,
}

impl Entity for Author {
    fn describe() -> PersistentEntity {
        PersistentEntity::new("Author")
            .with_identity(
                PersistentProperty::new("id", DataType::Uuid)
                    .with_auto_populated(AutoPopulated::Generated),
            )
            .with_property(PersistentProperty::new("name", DataType::String))
            .with_property(PersistentProperty::association(
                "novels",
                Association::new(AssociationKind::OneToMany, EntityRef::of::<Novel>())
                    .mapped_by("author"),
            ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: Option<Uuid>,
    pub name: String,
}

impl Entity for Genre {
    fn describe() -> PersistentEntity {
        PersistentEntity::new("Genre")
            .with_identity(
                PersistentProperty::new("id", DataType::Uuid)
                    .with_auto_populated(AutoPopulated::Generated),
            )
            .with_property(PersistentProperty::new("name", DataType::String))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Novel {
    pub id: i64,
    pub title: String,
    pub author: Option<Author>,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

impl Entity for Novel {
    fn describe() -> PersistentEntity {
        PersistentEntity::new("Novel")
            .with_identity(PersistentProperty::new("id", DataType::Long))
            .with_property(PersistentProperty::new("title", DataType::String))
            .with_property(PersistentProperty::association(
                "author",
                Association::new(AssociationKind::ManyToOne, EntityRef::of::<Author>())
                    .cascade_persist(),
            ))
            .with_property(PersistentProperty::association(
                "genres",
                Association::new(AssociationKind::ManyToMany, EntityRef::of::<Genre>())
                    .cascade_persist(),
            ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: Option<Uuid>,
    pub name: String,
    pub created: Option<DateTime<Utc>>,
}

impl Entity for Token {
    fn describe() -> PersistentEntity {
        PersistentEntity::new("Token")
            .with_identity(
                PersistentProperty::new("id", DataType::Uuid)
                    .with_auto_populated(AutoPopulated::Generated),
            )
            .with_property(PersistentProperty::new("name", DataType::String))
            .with_property(
                PersistentProperty::new("created", DataType::Timestamp)
                    .with_auto_populated(AutoPopulated::Created),
            )
    }
}

/// Always answers the same instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A statement handed to the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub args: Vec<Value>,
}

/// In-memory cache that records every statement and answers queries with
/// canned rows.
#[derive(Default)]
pub struct RecordingCache {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    fail_prefix: Option<&'static str>,
    queries: Mutex<Vec<Executed>>,
    writes: Mutex<Vec<Executed>>,
    open_cursors: Arc<AtomicUsize>,
    rows_served: Arc<AtomicUsize>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every query with `rows` under `columns`.
    pub fn with_rows(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(ToString::to_string).collect(),
            rows,
            ..Self::default()
        }
    }

    /// Fails every statement starting with `prefix`.
    pub fn failing(prefix: &'static str) -> Self {
        Self {
            fail_prefix: Some(prefix),
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<Executed> {
        self.queries.lock().clone()
    }

    pub fn writes(&self) -> Vec<Executed> {
        self.writes.lock().clone()
    }

    pub fn write_sql(&self) -> Vec<String> {
        self.writes.lock().iter().map(|e| e.sql.clone()).collect()
    }

    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    pub fn rows_served(&self) -> usize {
        self.rows_served.load(Ordering::SeqCst)
    }

    fn check(&self, sql: &str) -> anyhow::Result<()> {
        if let Some(prefix) = self.fail_prefix
            && sql.starts_with(prefix)
        {
            anyhow::bail!("cache rejected statement: {sql}");
        }
        Ok(())
    }
}

impl Cache for RecordingCache {
    fn query(&self, sql: &str, args: &[Value]) -> anyhow::Result<Box<dyn Cursor>> {
        self.check(sql)?;
        self.queries.lock().push(Executed {
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RowCursor {
            columns: self.columns.clone(),
            rows: self.rows.clone().into_iter(),
            open: Arc::clone(&self.open_cursors),
            served: Arc::clone(&self.rows_served),
        }))
    }

    fn execute(&self, sql: &str, args: &[Value]) -> anyhow::Result<u64> {
        self.check(sql)?;
        self.writes.lock().push(Executed {
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        Ok(1)
    }
}

struct RowCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<Value>>,
    open: Arc<AtomicUsize>,
    served: Arc<AtomicUsize>,
}

impl Iterator for RowCursor {
    type Item = anyhow::Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        self.served.fetch_add(1, Ordering::SeqCst);
        Some(Ok(row))
    }
}

impl Cursor for RowCursor {
    fn column_names(&self) -> &[String] {
        &self.columns
    }
}

impl Drop for RowCursor {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hands out one shared [`RecordingCache`] and remembers requested names.
pub struct RecordingProvider {
    pub cache: Arc<RecordingCache>,
    names: Mutex<Vec<String>>,
}

impl RecordingProvider {
    pub fn new(cache: RecordingCache) -> Arc<Self> {
        Arc::new(Self {
            cache: Arc::new(cache),
            names: Mutex::new(Vec::new()),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().clone()
    }
}

impl CacheProvider for RecordingProvider {
    fn cache(&self, name: &str) -> anyhow::Result<Arc<dyn Cache>> {
        self.names.lock().push(name.to_string());
        Ok(Arc::clone(&self.cache) as Arc<dyn Cache>)
    }
}

/// Normalize SQL by collapsing whitespace.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize SQL for comparison by removing identifier quotes and normalizing whitespace.
/// Preserves quotes inside string literals.
fn canonicalize_sql(sql: &str) -> String {
    let mut cleaned = String::with_capacity(sql.len());
    let mut in_single_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_single_quote = !in_single_quote;
                cleaned.push(ch);
            }
            '`' if !in_single_quote => {
                // Strip identifier quoting to avoid brittle comparisons.
            }
            _ => cleaned.push(ch),
        }
    }

    normalize_sql(&cleaned)
}

/// Assert that SQL contains all expected fragments in order.
///
/// Strips identifier quotes, normalizes whitespace, and checks that fragments
/// appear sequentially in the generated SQL.
#[allow(clippy::missing_panics_doc)]
pub fn assert_sql_contains(actual: &str, fragments: &[&str]) {
    let actual_canonical = canonicalize_sql(actual);
    let mut search_start = 0usize;

    for fragment in fragments {
        let fragment_canonical = canonicalize_sql(fragment);
        if fragment_canonical.is_empty() {
            continue;
        }

        if let Some(pos) = actual_canonical[search_start..].find(&fragment_canonical) {
            search_start += pos + fragment_canonical.len();
        } else {
            panic!(
                "expected SQL fragment `{fragment_canonical}` not found in `{actual_canonical}`"
            );
        }
    }
}

/// Number of `?` placeholders in a statement.
pub fn placeholder_count(sql: &str) -> usize {
    sql.matches('?').count()
}

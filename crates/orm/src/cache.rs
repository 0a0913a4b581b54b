//! Execution seam: named caches that run SQL and return row cursors.

use std::sync::Arc;

use crate::value::Value;

/// A forward-only, single pass sequence of rows.
///
/// Resources held by the cursor are released when it is dropped, including
/// when iteration stops early or fails.
pub trait Cursor: Iterator<Item = anyhow::Result<Vec<Value>>> + Send {
    /// Column names, in row order.
    fn column_names(&self) -> &[String];

    /// Number of columns in each row.
    fn column_count(&self) -> usize {
        self.column_names().len()
    }
}

/// A named cache able to run SQL.
pub trait Cache: Send + Sync {
    /// Runs a query and returns a cursor over its rows.
    ///
    /// # Errors
    ///
    /// Returns the execution error raised by the underlying engine.
    fn query(&self, sql: &str, args: &[Value]) -> anyhow::Result<Box<dyn Cursor>>;

    /// Runs a write and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns the execution error raised by the underlying engine.
    fn execute(&self, sql: &str, args: &[Value]) -> anyhow::Result<u64>;
}

/// Resolves caches by name.
pub trait CacheProvider: Send + Sync {
    /// The cache called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be opened.
    fn cache(&self, name: &str) -> anyhow::Result<Arc<dyn Cache>>;
}

//! Schema generation at startup.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use fromenv::FromEnv;

use crate::cache::CacheProvider;
use crate::ddl::{build_create_table_statements, build_drop_table_statements};
use crate::entity::PersistentEntity;
use crate::error::{Error, Result};

/// What to do with entity tables when a data source starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaGenerate {
    /// Leave the schema alone.
    #[default]
    None,
    /// Create every table.
    Create,
    /// Drop every table, then create it.
    CreateDrop,
}

impl FromStr for SchemaGenerate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "create" => Ok(Self::Create),
            "create-drop" | "create_drop" => Ok(Self::CreateDrop),
            _ => Err(Error::configuration(format!(
                "unknown schema generation mode [{s}], expected one of none, create, create-drop"
            ))),
        }
    }
}

/// Data source settings, loaded from the environment.
#[derive(Debug, Clone, FromEnv)]
pub struct DataSourceOptions {
    /// Data source name.
    #[env(from = "DATA_SOURCE_NAME", default = "default")]
    pub name: String,

    /// Client the data source connects through.
    #[env(from = "DATA_CLIENT", default = "default")]
    pub client: String,

    /// Cache schema statements are run against.
    #[env(from = "DATA_CACHE", default = "default")]
    pub cache: String,

    /// Raw schema generation mode, see [`SchemaGenerate`].
    #[env(from = "DATA_SCHEMA_GENERATE", default = "none")]
    pub schema_generate: String,
}

impl DataSourceOptions {
    /// Loads the options from `DATA_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a variable cannot be read.
    pub fn load() -> Result<Self> {
        Self::from_env()
            .finalize()
            .context("issue loading data source options")
            .map_err(|e| Error::configuration(format!("{e:#}")))
    }

    /// Parsed schema generation mode.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown modes.
    pub fn schema_generate(&self) -> Result<SchemaGenerate> {
        self.schema_generate.parse()
    }
}

/// Creates (and optionally drops) entity tables on a data source.
pub struct SchemaGenerator {
    provider: Arc<dyn CacheProvider>,
    options: DataSourceOptions,
}

impl SchemaGenerator {
    /// Generator for one data source.
    #[must_use]
    pub fn new(provider: Arc<dyn CacheProvider>, options: DataSourceOptions) -> Self {
        Self { provider, options }
    }

    /// Runs the configured mode for `entities`.
    ///
    /// Individual DROP and CREATE failures are logged and skipped so one
    /// existing table does not stop the rest.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown mode, a build error for
    /// unmappable metadata, and the execution error when the cache cannot be
    /// opened.
    pub fn generate(&self, entities: &[Arc<PersistentEntity>]) -> Result<()> {
        let mode = self.options.schema_generate()?;
        if mode == SchemaGenerate::None {
            return Ok(());
        }

        let mut creates = Vec::new();
        for entity in entities {
            creates.extend(build_create_table_statements(entity)?);
        }

        let cache = self.provider.cache(&self.options.cache)?;
        tracing::debug!(source = %self.options.name, ?mode, entities = entities.len(), "generating schema");

        if mode == SchemaGenerate::CreateDrop {
            for sql in entities.iter().flat_map(|entity| build_drop_table_statements(entity)) {
                if let Err(e) = cache.execute(&sql, &[]) {
                    tracing::trace!(sql = %sql, error = %e, "drop table failed");
                }
            }
        }

        for sql in &creates {
            if let Err(e) = cache.execute(sql, &[]) {
                tracing::warn!(sql = %sql, error = %e, "unable to create table");
            }
        }
        Ok(())
    }
}

//! Repository operations over a [`CacheProvider`].
//!
//! Queries are prepared (IN expansion, paging, argument flattening) before
//! anything reaches the cache. Writes are bound in full, cascades included,
//! before the first statement runs, so build and configuration errors never
//! leave a call half executed. Cursors are dropped on every exit path.

use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::bind::{Bean, BindMode, ParameterBinder};
use crate::cache::{Cache, CacheProvider, Cursor};
use crate::clock::{Clock, SystemClock};
use crate::codec::{JsonCodec, SerdeJsonCodec};
use crate::decode::{ResultDecoder, check_projection};
use crate::entity::{Entity, PersistentEntity, entity_of};
use crate::error::{Error, Result};
use crate::insert::{build_insert, build_join_table_insert};
use crate::prepare::{PreparedQuery, Statement, StatementPreparer};
use crate::query::QueryResult;
use crate::update::build_update;
use crate::value::Value;

/// What a repository declaration supplies to the operations.
#[derive(Debug, Clone)]
pub struct RepositoryDescriptor {
    name: String,
    cache: String,
    insert: Option<Arc<QueryResult>>,
    update: Option<Arc<QueryResult>>,
    generated: bool,
}

impl RepositoryDescriptor {
    /// A repository without stored statements. Queries work, writes fail
    /// with a configuration error until statements are supplied.
    pub fn new(name: impl Into<String>, cache: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cache: cache.into(),
            insert: None,
            update: None,
            generated: false,
        }
    }

    /// A repository whose INSERT and UPDATE are compiled from entity
    /// metadata on first use.
    pub fn generated(name: impl Into<String>, cache: impl Into<String>) -> Self {
        Self {
            generated: true,
            ..Self::new(name, cache)
        }
    }

    /// Declares the stored INSERT of the root entity. `paths` must line up
    /// with the placeholders.
    #[must_use]
    pub fn with_insert(mut self, insert: QueryResult) -> Self {
        self.insert = Some(Arc::new(insert));
        self
    }

    /// Declares the stored UPDATE of the root entity.
    #[must_use]
    pub fn with_update(mut self, update: QueryResult) -> Self {
        self.update = Some(Arc::new(update));
        self
    }

    /// Repository name, part of the memoization key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default cache.
    #[must_use]
    pub fn cache(&self) -> &str {
        &self.cache
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Stored {
    Insert,
    Update,
    JoinTable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StoredKey {
    repository: String,
    entity: String,
    statement: Stored,
}

/// Executes prepared queries and entity writes against named caches.
pub struct RepositoryOperations {
    provider: Arc<dyn CacheProvider>,
    codec: Arc<dyn JsonCodec>,
    clock: Arc<dyn Clock>,
    preparer: StatementPreparer,
    stored: DashMap<StoredKey, Arc<QueryResult>>,
}

impl RepositoryOperations {
    /// Operations with the `serde_json` codec and the system clock.
    #[must_use]
    pub fn new(provider: Arc<dyn CacheProvider>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            provider,
            codec: Arc::new(SerdeJsonCodec),
            preparer: StatementPreparer::new(Arc::clone(&clock)),
            clock,
            stored: DashMap::new(),
        }
    }

    /// Replaces the codec used for JSON properties.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn JsonCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the clock used for timestamps and `lastUpdated` bindings.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.preparer = StatementPreparer::new(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// The first result, if any.
    ///
    /// # Errors
    ///
    /// Returns build or configuration errors before executing, execution
    /// errors from the cache, and conversion errors while decoding.
    pub fn find_one<R: DeserializeOwned>(
        &self, repository: &RepositoryDescriptor, query: &PreparedQuery, args: &[Value],
    ) -> Result<Option<R>> {
        let mut cursor = self.open(repository, query, args)?;
        let decoder =
            ResultDecoder::new(query.root_entity(), query.result(), cursor.column_names(), self.codec.as_ref())?;
        cursor.next().transpose()?.map(|row| decoder.decode(row)).transpose()
    }

    /// Every result.
    ///
    /// # Errors
    ///
    /// See [`Self::find_one`].
    pub fn find_all<R: DeserializeOwned>(
        &self, repository: &RepositoryDescriptor, query: &PreparedQuery, args: &[Value],
    ) -> Result<Vec<R>> {
        let cursor = self.open(repository, query, args)?;
        let decoder =
            ResultDecoder::new(query.root_entity(), query.result(), cursor.column_names(), self.codec.as_ref())?;
        let mut results = Vec::new();
        for row in cursor {
            results.push(decoder.decode(row?)?);
        }
        Ok(results)
    }

    /// Every result as an iterator. The cursor is drained and released
    /// before this returns.
    ///
    /// # Errors
    ///
    /// See [`Self::find_one`].
    pub fn find_stream<R: DeserializeOwned>(
        &self, repository: &RepositoryDescriptor, query: &PreparedQuery, args: &[Value],
    ) -> Result<std::vec::IntoIter<R>> {
        Ok(self.find_all(repository, query, args)?.into_iter())
    }

    /// Whether the query yields at least one row. Stops after the first.
    ///
    /// # Errors
    ///
    /// Returns build or configuration errors before executing and execution
    /// errors from the cache.
    pub fn exists(
        &self, repository: &RepositoryDescriptor, query: &PreparedQuery, args: &[Value],
    ) -> Result<bool> {
        let statement = self.preparer.prepare(query, args)?;
        let cache = self.cache_for(repository, query)?;
        let mut cursor = cache.query(&statement.sql, &statement.args)?;
        Ok(cursor.next().transpose()?.is_some())
    }

    /// Runs an UPDATE or DELETE and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns build or configuration errors before executing and execution
    /// errors from the cache.
    pub fn execute_update(
        &self, repository: &RepositoryDescriptor, query: &PreparedQuery, args: &[Value],
    ) -> Result<u64> {
        let statement = self.preparer.prepare(query, args)?;
        let cache = self.cache_for(repository, query)?;
        Ok(cache.execute(&statement.sql, &statement.args)?)
    }

    /// Inserts an entity and returns it with generated values assigned.
    ///
    /// Referenced entities without identity are inserted first when their
    /// association cascades persistence, and join-table rows are written
    /// after the owner.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the repository has no INSERT, a
    /// build error for unmappable metadata, and execution errors from the
    /// cache.
    pub fn persist<T: Entity>(&self, repository: &RepositoryDescriptor, entity: T) -> Result<T> {
        let root = entity_of::<T>();
        let mut bean = to_bean(&entity)?;
        let mut plan = Vec::new();
        self.plan_insert(repository, &root, &mut bean, true, &mut plan)?;

        let cache = self.provider.cache(repository.cache())?;
        execute_plan(cache.as_ref(), &plan)?;
        Ok(serde_json::from_value(JsonValue::Object(bean))?)
    }

    /// Persists each entity in turn, one INSERT per entity.
    ///
    /// # Errors
    ///
    /// Stops at the first failing entity; earlier rows stay written.
    pub fn persist_all<T: Entity>(
        &self, repository: &RepositoryDescriptor, entities: impl IntoIterator<Item = T>,
    ) -> Result<Vec<T>> {
        entities.into_iter().map(|entity| self.persist(repository, entity)).collect()
    }

    /// Updates an entity by identity and returns it with refreshed
    /// timestamps.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the repository has no UPDATE, a
    /// build error when the entity has no identity, and execution errors
    /// from the cache.
    pub fn update<T: Entity>(&self, repository: &RepositoryDescriptor, entity: T) -> Result<T> {
        let root = entity_of::<T>();
        let update = self.stored_update(repository, &root)?;
        let mut bean = to_bean(&entity)?;

        let mut plan = Vec::new();
        let binder = ParameterBinder::new(self.codec.as_ref(), self.clock.as_ref());
        let args = {
            let mut cascade = |child: &Arc<PersistentEntity>, child_bean: &mut Bean| {
                self.plan_insert(repository, child, child_bean, false, &mut plan)
            };
            binder.bind(&root, &update.paths, &mut bean, BindMode::Update, &mut cascade)?
        };
        tracing::debug!(table = root.persisted_name(), sql = %update.query, param_count = args.len(), "bound update");
        plan.push(Statement {
            sql: update.query.clone(),
            args,
        });

        let cache = self.provider.cache(repository.cache())?;
        execute_plan(cache.as_ref(), &plan)?;
        Ok(serde_json::from_value(JsonValue::Object(bean))?)
    }

    /// Updates each entity in turn.
    ///
    /// # Errors
    ///
    /// Stops at the first failing entity.
    pub fn update_all<T: Entity>(
        &self, repository: &RepositoryDescriptor, entities: impl IntoIterator<Item = T>,
    ) -> Result<Vec<T>> {
        entities.into_iter().map(|entity| self.update(repository, entity)).collect()
    }

    /// Lookup by identity is not offered; run an explicit query instead.
    ///
    /// # Errors
    ///
    /// Always returns an unsupported error.
    pub fn find_by_id<T: Entity>(&self, _repository: &RepositoryDescriptor, _id: &Value) -> Result<Option<T>> {
        Err(Error::unsupported(format!(
            "find by id is not supported for {}, execute the SQL query directly",
            entity_of::<T>().name()
        )))
    }

    /// Counting without an explicit query is not offered.
    ///
    /// # Errors
    ///
    /// Always returns an unsupported error.
    pub fn count<T: Entity>(&self, _repository: &RepositoryDescriptor) -> Result<u64> {
        Err(Error::unsupported(format!(
            "count without an explicit query is not supported for {}, use a COUNT projection instead",
            entity_of::<T>().name()
        )))
    }

    /// Batched deletes are not offered.
    ///
    /// # Errors
    ///
    /// Always returns an unsupported error.
    pub fn delete_all<T: Entity>(&self, _repository: &RepositoryDescriptor, _entities: &[T]) -> Result<u64> {
        Err(Error::unsupported(format!(
            "batched delete is not supported for {}, execute a DELETE query instead",
            entity_of::<T>().name()
        )))
    }

    fn open(
        &self, repository: &RepositoryDescriptor, query: &PreparedQuery, args: &[Value],
    ) -> Result<Box<dyn Cursor>> {
        check_projection(query.root_entity(), query.result())?;
        let statement = self.preparer.prepare(query, args)?;
        let cache = self.cache_for(repository, query)?;
        Ok(cache.query(&statement.sql, &statement.args)?)
    }

    fn cache_for(&self, repository: &RepositoryDescriptor, query: &PreparedQuery) -> Result<Arc<dyn Cache>> {
        Ok(self.provider.cache(query.cache().unwrap_or_else(|| repository.cache()))?)
    }

    /// Binds the INSERT of `bean` onto `plan`. Referenced rows are planned
    /// before the referencing row, join-table rows after the owner.
    fn plan_insert(
        &self, repository: &RepositoryDescriptor, entity: &Arc<PersistentEntity>, bean: &mut Bean,
        root: bool, plan: &mut Vec<Statement>,
    ) -> Result<()> {
        let insert = self.stored_insert(repository, entity, root)?;
        let binder = ParameterBinder::new(self.codec.as_ref(), self.clock.as_ref());
        let args = {
            let mut cascade = |child: &Arc<PersistentEntity>, child_bean: &mut Bean| {
                self.plan_insert(repository, child, child_bean, false, plan)
            };
            binder.bind(entity, &insert.paths, bean, BindMode::Insert, &mut cascade)?
        };

        tracing::debug!(table = entity.persisted_name(), sql = %insert.query, param_count = args.len(), "bound insert");
        plan.push(Statement {
            sql: insert.query.clone(),
            args,
        });
        self.plan_join_rows(repository, entity, bean, plan)
    }

    /// Links the owner to every element of its cascading join-table
    /// associations.
    fn plan_join_rows(
        &self, repository: &RepositoryDescriptor, entity: &Arc<PersistentEntity>, bean: &mut Bean,
        plan: &mut Vec<Statement>,
    ) -> Result<()> {
        let cascading: Vec<_> = entity
            .join_table_associations()
            .filter(|property| property.as_association().is_some_and(|a| a.cascades_persist()))
            .collect();
        if cascading.is_empty() {
            return Ok(());
        }

        let identity = entity.required_identity()?;
        let owner_id = Value::from_json(identity.accessor().read(bean), identity.data_type())?;

        for property in cascading {
            let Some(association) = property.as_association() else { continue };
            let associated = association.associated_entity();
            let associated_identity = associated.required_identity()?;
            let insert = self.stored_join_table_insert(repository, entity, property.name())?;

            let Some(JsonValue::Array(children)) = property.accessor().read_mut(bean) else {
                continue;
            };
            for child in children.iter_mut() {
                let JsonValue::Object(child) = child else { continue };
                if owner_id.is_null() {
                    return Err(Error::build(format!(
                        "entity {} has no identity to link through [{}]",
                        entity.name(),
                        property.name()
                    )));
                }
                if associated_identity.accessor().read(child).is_null() {
                    self.plan_insert(repository, &associated, child, false, plan)?;
                }
                let child_id =
                    Value::from_json(associated_identity.accessor().read(child), associated_identity.data_type())?;
                if child_id.is_null() {
                    return Err(Error::build(format!(
                        "referenced entity {} has no identity after cascade through [{}]",
                        associated.name(),
                        property.name()
                    )));
                }
                plan.push(Statement {
                    sql: insert.query.clone(),
                    args: vec![owner_id.clone(), child_id],
                });
            }
        }
        Ok(())
    }

    fn stored_insert(
        &self, repository: &RepositoryDescriptor, entity: &PersistentEntity, root: bool,
    ) -> Result<Arc<QueryResult>> {
        if root && let Some(insert) = &repository.insert {
            return Ok(Arc::clone(insert));
        }
        if root && !repository.generated {
            return Err(Error::configuration(format!(
                "no insert statement present in repository {} for entity {}",
                repository.name(),
                entity.name()
            )));
        }
        self.memoized(repository, entity, Stored::Insert, || build_insert(entity))
    }

    fn stored_update(
        &self, repository: &RepositoryDescriptor, entity: &PersistentEntity,
    ) -> Result<Arc<QueryResult>> {
        if let Some(update) = &repository.update {
            return Ok(Arc::clone(update));
        }
        if !repository.generated {
            return Err(Error::configuration(format!(
                "no update statement present in repository {} for entity {}",
                repository.name(),
                entity.name()
            )));
        }
        self.memoized(repository, entity, Stored::Update, || build_update(entity))
    }

    fn stored_join_table_insert(
        &self, repository: &RepositoryDescriptor, entity: &PersistentEntity, property: &str,
    ) -> Result<Arc<QueryResult>> {
        self.memoized(repository, entity, Stored::JoinTable(property.to_string()), || {
            let property = entity.property_by_name(property).ok_or_else(|| {
                Error::build(format!("entity {} has no property [{property}]", entity.name()))
            })?;
            build_join_table_insert(entity, property)
        })
    }

    /// Compiles outside the map lock; the first writer wins.
    fn memoized(
        &self, repository: &RepositoryDescriptor, entity: &PersistentEntity, statement: Stored,
        compile: impl FnOnce() -> Result<QueryResult>,
    ) -> Result<Arc<QueryResult>> {
        let key = StoredKey {
            repository: repository.name().to_string(),
            entity: entity.name().to_string(),
            statement,
        };
        if let Some(stored) = self.stored.get(&key) {
            return Ok(Arc::clone(stored.value()));
        }
        let compiled = Arc::new(compile()?);
        Ok(Arc::clone(self.stored.entry(key).or_insert(compiled).value()))
    }
}

fn execute_plan(cache: &dyn Cache, plan: &[Statement]) -> Result<()> {
    for statement in plan {
        tracing::debug!(sql = %statement.sql, param_count = statement.args.len(), "executing statement");
        cache.execute(&statement.sql, &statement.args)?;
    }
    Ok(())
}

fn to_bean<T: Entity>(entity: &T) -> Result<Bean> {
    match serde_json::to_value(entity)? {
        JsonValue::Object(bean) => Ok(bean),
        other => Err(Error::conversion(format!(
            "entity {} does not serialize to an object: {other}",
            entity_of::<T>().name()
        ))),
    }
}

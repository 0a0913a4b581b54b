use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::entity::{Entity, PersistentEntity, entity_of};
use crate::error::{Error, Result};
use crate::page::{Pageable, build_pagination};
use crate::query::{IN_EXPRESSION_END, IN_EXPRESSION_START, QueryResult};
use crate::select::{QueryModel, build_order_by, build_query, order_list};
use crate::value::Value;

/// Token naming the synthetic "last updated" binding.
pub const LAST_UPDATED: &str = "lastUpdated";

/// Where the value of one placeholder comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterBinding {
    /// The argument at this index.
    Argument(usize),
    /// A property read off the object argument at `argument`.
    Property {
        /// Argument index.
        argument: usize,
        /// Dotted property path, never empty.
        path: String,
    },
    /// The current time, from the preparer's clock.
    LastUpdated,
}

impl ParameterBinding {
    /// Nested binding `argument.path`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `path` is empty.
    pub fn property(argument: usize, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if path.is_empty() {
            return Err(Error::configuration(format!(
                "nested parameter binding for argument {argument} has no property path"
            )));
        }
        Ok(Self::Property { argument, path })
    }
}

impl From<usize> for ParameterBinding {
    fn from(argument: usize) -> Self {
        Self::Argument(argument)
    }
}

impl FromStr for ParameterBinding {
    type Err = Error;

    /// Parses `2`, `2.title` or `lastUpdated`.
    fn from_str(s: &str) -> Result<Self> {
        if s == LAST_UPDATED {
            return Ok(Self::LastUpdated);
        }
        let (index, path) = match s.split_once('.') {
            Some((index, path)) => (index, Some(path)),
            None => (s, None),
        };
        let argument = index
            .parse::<usize>()
            .map_err(|e| Error::configuration(format!("invalid parameter binding [{s}]: {e}")))?;
        match path {
            Some(path) => Self::property(argument, path),
            None => Ok(Self::Argument(argument)),
        }
    }
}

impl fmt::Display for ParameterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument(argument) => write!(f, "{argument}"),
            Self::Property { argument, path } => write!(f, "{argument}.{path}"),
            Self::LastUpdated => f.write_str(LAST_UPDATED),
        }
    }
}

/// Shape of the rows a query returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResultKind {
    /// The first column of each row.
    #[default]
    Scalar,
    /// The named root entity properties, read by column name.
    Dto(Vec<String>),
    /// A full entity graph. Not supported.
    Entity,
}

/// A compiled query together with everything needed to execute it.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    compiled: QueryResult,
    root_entity: Arc<PersistentEntity>,
    result: ResultKind,
    cache: Option<String>,
    pageable: Pageable,
    mutating: bool,
    single_result: bool,
    sorted: bool,
}

impl PreparedQuery {
    /// Wraps compiled SQL for the given root entity.
    #[must_use]
    pub fn new(root_entity: Arc<PersistentEntity>, compiled: QueryResult) -> Self {
        Self {
            compiled,
            root_entity,
            result: ResultKind::Scalar,
            cache: None,
            pageable: Pageable::unpaged(),
            mutating: false,
            single_result: false,
            sorted: false,
        }
    }

    /// Compiles a query model.
    ///
    /// # Errors
    ///
    /// Returns a build error if the model cannot be compiled.
    pub fn from_model(model: &QueryModel) -> Result<Self> {
        let query = Self::new(Arc::clone(model.entity()), build_query(model)?);
        Ok(Self {
            sorted: model.sort().is_sorted(),
            ..query
        })
    }

    /// Raw SQL over entity `T`, with one binding per placeholder.
    #[must_use]
    pub fn sql<T: Entity>(query: impl Into<String>, bindings: Vec<ParameterBinding>) -> Self {
        let compiled = QueryResult {
            query: query.into(),
            parameter_types: vec![None; bindings.len()],
            bindings,
            paths: Vec::new(),
        };
        Self::new(entity_of::<T>(), compiled)
    }

    /// Projects the named properties into a DTO.
    #[must_use]
    pub fn dto(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.result = ResultKind::Dto(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the result kind.
    #[must_use]
    pub fn with_result(mut self, result: ResultKind) -> Self {
        self.result = result;
        self
    }

    /// Runs against the named cache instead of the repository's.
    #[must_use]
    pub fn in_cache(mut self, cache: impl Into<String>) -> Self {
        self.cache = Some(cache.into());
        self
    }

    /// Applies a page request.
    #[must_use]
    pub fn with_pageable(mut self, pageable: Pageable) -> Self {
        self.pageable = pageable;
        self
    }

    /// Marks the statement as a write; writes are never paged.
    #[must_use]
    pub const fn mutating(mut self) -> Self {
        self.mutating = true;
        self
    }

    /// Declares that the text already ends with an `ORDER BY` clause, so
    /// page request orders extend it.
    #[must_use]
    pub const fn sorted(mut self) -> Self {
        self.sorted = true;
        self
    }

    /// Declares that at most one row is read.
    #[must_use]
    pub const fn single(mut self) -> Self {
        self.single_result = true;
        self
    }

    /// The compiled text and binding table.
    #[must_use]
    pub const fn compiled(&self) -> &QueryResult {
        &self.compiled
    }

    /// The root entity.
    #[must_use]
    pub const fn root_entity(&self) -> &Arc<PersistentEntity> {
        &self.root_entity
    }

    /// The result kind.
    #[must_use]
    pub const fn result(&self) -> &ResultKind {
        &self.result
    }

    /// Cache override, if any.
    #[must_use]
    pub fn cache(&self) -> Option<&str> {
        self.cache.as_deref()
    }

    /// Whether the result is a DTO projection.
    #[must_use]
    pub const fn is_dto_projection(&self) -> bool {
        matches!(self.result, ResultKind::Dto(_))
    }

    /// Whether the text holds IN-expression tokens.
    #[must_use]
    pub fn has_in_expression(&self) -> bool {
        self.compiled.has_in_expression()
    }
}

/// Final SQL text and positional arguments, ready for the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text; every placeholder is a plain `?`.
    pub sql: String,
    /// One value per `?`, in order.
    pub args: Vec<Value>,
}

/// Resolves prepared queries and live arguments into executable statements.
#[derive(Clone)]
pub struct StatementPreparer {
    clock: Arc<dyn Clock>,
}

impl Default for StatementPreparer {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl StatementPreparer {
    /// Creates a preparer reading the current time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Expands IN tokens, applies paging, and flattens bound values.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for bindings that refer to missing
    /// arguments or malformed tokens, and a build error for sorts on
    /// unknown properties. Nothing is executed either way.
    pub fn prepare(&self, query: &PreparedQuery, args: &[Value]) -> Result<Statement> {
        let bindings = &query.compiled.bindings;
        let values =
            bindings.iter().map(|binding| self.resolve(binding, args)).collect::<Result<Vec<_>>>()?;

        let mut ignored = vec![false; values.len()];
        let sql = expand_in_expressions(&query.compiled.query, &values, &mut ignored)?;
        let sql = self.paginate(query, sql)?;

        let mut flat = Vec::with_capacity(values.len());
        for (value, ignored) in values.into_iter().zip(ignored) {
            if ignored {
                continue;
            }
            match value {
                Value::List(items) => flat.extend(items),
                other => flat.push(other),
            }
        }

        tracing::debug!(sql = %sql, param_count = flat.len(), "prepared statement");
        Ok(Statement { sql, args: flat })
    }

    fn resolve(&self, binding: &ParameterBinding, args: &[Value]) -> Result<Value> {
        let argument = |index: usize| {
            args.get(index).ok_or_else(|| {
                Error::configuration(format!(
                    "parameter binding refers to argument {index}, but {} were supplied",
                    args.len()
                ))
            })
        };

        match binding {
            ParameterBinding::Argument(index) => argument(*index).cloned(),
            ParameterBinding::Property { argument: index, path } => match argument(*index)? {
                Value::Null => Ok(Value::Null),
                object @ Value::Object(_) => Ok(object.get_path(path).cloned().unwrap_or(Value::Null)),
                other => Err(Error::configuration(format!(
                    "parameter binding {index}.{path} reads a property off a non-object argument: {other:?}"
                ))),
            },
            ParameterBinding::LastUpdated => Ok(Value::Timestamp(self.clock.now())),
        }
    }

    fn paginate(&self, query: &PreparedQuery, mut sql: String) -> Result<String> {
        let pageable = &query.pageable;
        if query.mutating || (!pageable.is_paged() && !pageable.sort.is_sorted()) {
            return Ok(sql);
        }

        if pageable.sort.is_sorted() {
            let entity = &query.root_entity;
            if query.sorted {
                sql.push(',');
                sql.push_str(&order_list(entity, &entity.alias_name(), &pageable.sort)?);
            } else {
                sql.push_str(&build_order_by(entity, &entity.alias_name(), &pageable.sort)?);
            }
        }

        if query.single_result && pageable.offset != 0 {
            let clamped = Pageable {
                size: 1,
                ..pageable.clone()
            };
            sql.push_str(&build_pagination(&clamped));
        } else {
            sql.push_str(&build_pagination(pageable));
        }
        Ok(sql)
    }
}

/// Replaces every IN-expression token with `<column> IN(?,...)` sized to
/// the bound collection, or with `1 = 2` when the collection is null or
/// empty (the slot is then marked ignored and binds nothing).
fn expand_in_expressions(query: &str, values: &[Value], ignored: &mut [bool]) -> Result<String> {
    let mut sql = query.to_string();

    while let Some(start) = sql.find(IN_EXPRESSION_START) {
        let body = start + IN_EXPRESSION_START.len();
        let malformed = || Error::configuration(format!("malformed IN expression in query: {query}"));
        let end = sql[body..].find(IN_EXPRESSION_END).map(|i| body + i).ok_or_else(malformed)?;
        let (slot, column) = sql[body..end].split_once(':').ok_or_else(malformed)?;
        let slot: usize = slot.parse().map_err(|_e| malformed())?;
        let value = values.get(slot).ok_or_else(|| {
            Error::configuration(format!("IN expression refers to missing binding {slot}"))
        })?;

        let size = match value {
            Value::Null => 0,
            Value::List(items) => items.len(),
            _ => 1,
        };
        let replacement = if size == 0 {
            ignored[slot] = true;
            "1 = 2".to_string()
        } else {
            format!("{column} IN({})", vec!["?"; size].join(","))
        };

        sql.replace_range(start..=end, &replacement);
    }

    Ok(sql)
}

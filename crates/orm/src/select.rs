use std::collections::HashMap;
use std::sync::Arc;

use sea_query::{Expr, ExprTrait, SimpleExpr};

use crate::entity::{Entity, PersistentEntity, entity_of};
use crate::error::{Error, Result};
use crate::filter::Criterion;
use crate::join::{JoinPath, JoinType, build_join};
use crate::page::Sort;
use crate::prepare::ParameterBinding;
use crate::property::DataType;
use crate::query::{QueryBuilder, QueryResult};

/// What a SELECT returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// Every column of the root entity, plus fetch-joined columns.
    #[default]
    All,
    /// `COUNT(*)`
    Count,
    /// The named property paths, in order.
    Properties(Vec<String>),
}

/// Declarative description of a query against one root entity.
#[derive(Debug, Clone)]
pub struct QueryModel {
    entity: Arc<PersistentEntity>,
    projection: Projection,
    criteria: Vec<Criterion>,
    joins: Vec<JoinPath>,
    sort: Sort,
}

impl QueryModel {
    /// Query over the given entity metadata.
    #[must_use]
    pub fn from(entity: Arc<PersistentEntity>) -> Self {
        Self {
            entity,
            projection: Projection::All,
            criteria: Vec::new(),
            joins: Vec::new(),
            sort: Sort::unsorted(),
        }
    }

    /// Query over entity `T`.
    #[must_use]
    pub fn of<T: Entity>() -> Self {
        Self::from(entity_of::<T>())
    }

    /// Sets the projection.
    #[must_use]
    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Adds a criterion; criteria are combined with AND.
    #[must_use]
    pub fn filter(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Joins an association path.
    #[must_use]
    pub fn join(mut self, path: impl Into<String>, join_type: JoinType) -> Self {
        self.joins.push(JoinPath::new(path, join_type));
        self
    }

    /// Joins an association path with an explicit alias.
    #[must_use]
    pub fn join_path(mut self, join: JoinPath) -> Self {
        self.joins.push(join);
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub fn order_by(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// The root entity.
    #[must_use]
    pub const fn entity(&self) -> &Arc<PersistentEntity> {
        &self.entity
    }

    /// Declared joins.
    #[must_use]
    pub fn joins(&self) -> &[JoinPath] {
        &self.joins
    }

    /// Declared sort.
    #[must_use]
    pub const fn sort(&self) -> &Sort {
        &self.sort
    }
}

/// Mutable state threaded through the builders while a statement is
/// rendered: aliases in use, JOIN text, and the binding table.
pub(crate) struct QueryState<'a> {
    model: &'a QueryModel,
    alias: String,
    applied: HashMap<String, String>,
    paths: HashMap<String, (String, Arc<PersistentEntity>)>,
    joins: String,
    bindings: Vec<ParameterBinding>,
    parameter_types: Vec<Option<DataType>>,
}

impl<'a> QueryState<'a> {
    pub(crate) fn new(model: &'a QueryModel, alias: String) -> Self {
        Self {
            model,
            alias,
            applied: HashMap::new(),
            paths: HashMap::new(),
            joins: String::new(),
            bindings: Vec::new(),
            parameter_types: Vec::new(),
        }
    }

    pub(crate) fn entity(&self) -> &Arc<PersistentEntity> {
        &self.model.entity
    }

    pub(crate) fn alias(&self) -> &str {
        &self.alias
    }

    pub(crate) fn applied_alias(&self, key: &str) -> Option<String> {
        self.applied.get(key).cloned()
    }

    pub(crate) fn apply(&mut self, key: String, alias: String) {
        self.applied.insert(key, alias);
    }

    /// Alias of a join declared on the model for exactly this path.
    pub(crate) fn declared_alias(&self, path: &str) -> Option<String> {
        self.model.joins.iter().find(|join| join.path() == path).map(JoinPath::alias_name)
    }

    pub(crate) fn record_path(&mut self, path: String, alias: String, entity: Arc<PersistentEntity>) {
        self.paths.insert(path, (alias, entity));
    }

    /// Appends a JOIN clause unless identical text is already present.
    pub(crate) fn push_join(&mut self, clause: &str) {
        if !self.joins.contains(clause) {
            self.joins.push_str(clause);
        }
    }

    pub(crate) fn push_raw(&mut self, text: &str) {
        self.joins.push_str(text);
    }

    /// Rendered column and data type for a property path.
    pub(crate) fn resolve_column(&self, path: &str) -> Result<(String, DataType)> {
        if let Some((prefix, leaf)) = path.rsplit_once('.')
            && let Some((alias, joined)) = self.paths.get(prefix)
        {
            return column_for_path(joined, alias, leaf);
        }
        column_for_path(&self.model.entity, &self.alias, path)
    }

    pub(crate) fn column_expr(&self, path: &str) -> Result<SimpleExpr> {
        Ok(Expr::cust(self.resolve_column(path)?.0))
    }

    /// Registers a binding and returns its slot in the binding table.
    pub(crate) fn push_binding(&mut self, path: &str, binding: ParameterBinding) -> Result<usize> {
        let (_, data_type) = self.resolve_column(path)?;
        self.bindings.push(binding);
        self.parameter_types.push(Some(data_type));
        Ok(self.bindings.len() - 1)
    }

    /// Registers a binding and returns its `?` placeholder.
    pub(crate) fn placeholder(&mut self, path: &str, binding: ParameterBinding) -> Result<SimpleExpr> {
        self.push_binding(path, binding)?;
        Ok(Expr::cust("?"))
    }

    pub(crate) fn where_clause(&mut self) -> Result<Option<String>> {
        let mut condition: Option<SimpleExpr> = None;
        for criterion in self.model.criteria.clone() {
            let expr = criterion.into_expr(self)?;
            condition = Some(match condition {
                Some(left) => left.and(expr),
                None => expr,
            });
        }
        Ok(condition.map(|condition| QueryBuilder::default().render(&condition)))
    }

    pub(crate) fn finish(self, query: String) -> QueryResult {
        QueryResult {
            query,
            bindings: self.bindings,
            parameter_types: self.parameter_types,
            paths: Vec::new(),
        }
    }
}

fn qualify(alias: &str, column: &str) -> String {
    if alias.is_empty() { column.to_string() } else { format!("{alias}.{column}") }
}

/// Rendered column for a path relative to one entity: a property, an
/// embedded sub-property, or the identity of a to-one reference.
fn column_for_path(entity: &PersistentEntity, alias: &str, path: &str) -> Result<(String, DataType)> {
    let unknown = || {
        Error::build(format!("cannot query entity [{}] on non-existent property: {path}", entity.name()))
    };

    let Some((owner, sub)) = path.split_once('.') else {
        let property = entity.property_by_name(path).ok_or_else(unknown)?;
        if property.is_foreign_key() || property.as_embedded().is_some() {
            return Err(Error::build(format!(
                "property [{path}] of entity [{}] has no single column, query one of its properties instead",
                entity.name()
            )));
        }
        let data_type = match property.as_association() {
            Some(association) => {
                association.associated_entity().required_identity()?.data_type()
            }
            None => property.data_type(),
        };
        return Ok((qualify(alias, &entity.quote(property.persisted_name())), data_type));
    };

    let owner_property = entity.property_by_name(owner).ok_or_else(unknown)?;
    let association = owner_property.as_association().ok_or_else(unknown)?;
    let associated = association.associated_entity();

    if association.is_embedded() {
        let sub_property = associated.property_by_name(sub).ok_or_else(unknown)?;
        let column = entity.embedded_column_name(owner_property, sub_property);
        return Ok((qualify(alias, &entity.quote(&column)), sub_property.data_type()));
    }

    let identity = associated.required_identity()?;
    if !association.is_foreign_key() && identity.name() == sub {
        return Ok((qualify(alias, &entity.quote(owner_property.persisted_name())), identity.data_type()));
    }

    Err(Error::build(format!(
        "property path [{path}] of entity [{}] requires a join on [{owner}]",
        entity.name()
    )))
}

/// Compiles a query model into SELECT text and its binding table.
///
/// # Errors
///
/// Returns a build error for unknown property paths and unjoinable
/// associations.
pub fn build_query(model: &QueryModel) -> Result<QueryResult> {
    let entity = Arc::clone(&model.entity);
    let mut state = QueryState::new(model, entity.alias_name());

    for join in &model.joins {
        build_join(&mut state, join)?;
    }

    let mut sql = String::from("SELECT ");
    match &model.projection {
        Projection::All => {
            sql.push_str(&select_all_columns(&entity, state.alias()));
            for join in model.joins.iter().filter(|join| join.join_type().is_fetch()) {
                sql.push_str(&fetch_columns(&state, join)?);
            }
        }
        Projection::Count => sql.push_str("COUNT(*)"),
        Projection::Properties(paths) => {
            let columns = paths
                .iter()
                .map(|path| state.resolve_column(path).map(|(column, _)| column))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&columns.join(","));
        }
    }

    sql.push_str(" FROM ");
    sql.push_str(&entity.table_name());
    sql.push(' ');
    sql.push_str(state.alias());
    sql.push_str(&state.joins);

    if let Some(condition) = state.where_clause()? {
        sql.push_str(" WHERE (");
        sql.push_str(&condition);
        sql.push(')');
    }

    if model.sort.is_sorted() {
        sql.push_str(&build_order_by(&entity, state.alias(), &model.sort)?);
    }

    let result = state.finish(sql);
    tracing::debug!(
        table = entity.persisted_name(),
        sql = %result.query,
        param_count = result.bindings.len(),
        "build_query generated SQL"
    );
    Ok(result)
}

/// Renders ` ORDER BY ...` for a sort against the root entity.
///
/// # Errors
///
/// Returns a build error when an order names an unknown property.
pub fn build_order_by(entity: &PersistentEntity, alias: &str, sort: &Sort) -> Result<String> {
    Ok(format!(" ORDER BY {}", order_list(entity, alias, sort)?))
}

/// The comma separated orders of `sort`, without the `ORDER BY` keyword.
pub(crate) fn order_list(entity: &PersistentEntity, alias: &str, sort: &Sort) -> Result<String> {
    let orders = sort
        .orders()
        .iter()
        .map(|order| Ok(order.render(&column_for_path(entity, alias, &order.property)?.0)))
        .collect::<Result<Vec<_>>>()?;
    Ok(orders.join(","))
}

/// Every column of the entity, identity last, qualified by `alias`.
#[must_use]
pub fn select_all_columns(entity: &PersistentEntity, alias: &str) -> String {
    let columns = entity.flattened_columns();
    if columns.is_empty() {
        return "*".to_string();
    }
    columns.iter().map(|c| qualify(alias, &c.column)).collect::<Vec<_>>().join(",")
}

/// `,alias.col AS path_col,...` for a fetch join.
fn fetch_columns(state: &QueryState, join: &JoinPath) -> Result<String> {
    let Some((alias, associated)) = state.paths.get(join.path()) else {
        return Ok(String::new());
    };
    let path_alias = crate::join::path_alias(join.path());

    let mut columns: Vec<String> = associated
        .flattened_columns()
        .into_iter()
        .filter(|column| !column.identity)
        .map(|column| {
            let plain = column.column.trim_matches('`').to_string();
            format!("{alias}.{} AS {path_alias}{plain}", column.column)
        })
        .collect();

    let identity = associated.required_identity()?;
    if identity.as_embedded().is_none() {
        let column = associated.quote(identity.persisted_name());
        columns.insert(0, format!("{alias}.{column} AS {path_alias}{}", identity.persisted_name()));
    }

    if columns.is_empty() {
        return Ok(String::new());
    }
    Ok(format!(",{}", columns.join(",")))
}

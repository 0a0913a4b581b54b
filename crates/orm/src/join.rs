use std::sync::Arc;

use crate::ddl::{join_table_name, resolve_join_table_columns};
use crate::error::{Error, Result};
use crate::naming::NamingStrategy;
use crate::select::QueryState;

/// JOIN flavour requested for an association path.
///
/// FETCH variants also add the joined entity's columns to the select list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinType {
    /// INNER JOIN
    #[default]
    Inner,
    /// LEFT JOIN
    Left,
    /// RIGHT JOIN
    Right,
    /// FULL OUTER JOIN
    Outer,
    /// INNER JOIN, fetching the joined columns
    Fetch,
    /// LEFT JOIN, fetching the joined columns
    LeftFetch,
    /// RIGHT JOIN, fetching the joined columns
    RightFetch,
}

impl JoinType {
    /// The SQL keyword, surrounded by spaces.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Left | Self::LeftFetch => " LEFT JOIN ",
            Self::Right | Self::RightFetch => " RIGHT JOIN ",
            Self::Outer => " FULL OUTER JOIN ",
            Self::Inner | Self::Fetch => " INNER JOIN ",
        }
    }

    /// Whether the joined columns are selected.
    #[must_use]
    pub const fn is_fetch(self) -> bool {
        matches!(self, Self::Fetch | Self::LeftFetch | Self::RightFetch)
    }
}

/// A dotted association path to join, e.g. `author` or `author.publisher`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPath {
    path: String,
    join_type: JoinType,
    alias: Option<String>,
}

impl JoinPath {
    /// Joins `path` with the given type.
    #[must_use]
    pub fn new(path: impl Into<String>, join_type: JoinType) -> Self {
        Self {
            path: path.into(),
            join_type,
            alias: None,
        }
    }

    /// Overrides the table alias of the last hop.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The association path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The join type.
    #[must_use]
    pub const fn join_type(&self) -> JoinType {
        self.join_type
    }

    /// Table alias: the explicit alias, else the path with dots replaced,
    /// e.g. `author_publisher_`.
    #[must_use]
    pub fn alias_name(&self) -> String {
        self.alias.clone().unwrap_or_else(|| path_alias(&self.path))
    }
}

/// Alias derived from a path alone.
pub(crate) fn path_alias(path: &str) -> String {
    format!("{}_", NamingStrategy::UnderScoreSeparatedLowerCase.mapped_name(&path.replace('.', "_")))
}

/// Appends the JOIN clauses for `join` to the query state and returns the
/// alias used for every hop.
///
/// Prefixes already joined reuse their alias, and identical JOIN text is
/// never appended twice.
pub(crate) fn build_join(state: &mut QueryState, join: &JoinPath) -> Result<Vec<String>> {
    if join.path.is_empty() {
        return Err(Error::build("invalid association path []"));
    }

    let segments: Vec<&str> = join.path.split('.').collect();
    let keyword = join.join_type.keyword();
    let mut alias = state.alias().to_string();
    let mut owner = Arc::clone(state.entity());
    let mut path_so_far = String::new();
    let mut aliases = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            path_so_far.push('.');
        }
        path_so_far.push_str(segment);

        let property = owner.property_by_name(segment).ok_or_else(|| {
            Error::build(format!("invalid association path [{}]: entity {} has no property {segment}", join.path, owner.name()))
        })?;
        let association = property
            .as_association()
            .filter(|association| !association.is_embedded())
            .ok_or_else(|| {
                Error::build(format!(
                    "invalid association path [{}]: property {segment} of entity {} is not an association",
                    join.path,
                    owner.name()
                ))
            })?;
        let associated = association.associated_entity();

        let applied_key = format!("{alias}.{segment}");
        let join_alias = if let Some(existing) = state.applied_alias(&applied_key) {
            existing
        } else {
            let join_alias = if i + 1 == segments.len() {
                join.alias_name()
            } else {
                state.declared_alias(&path_so_far).unwrap_or_else(|| path_alias(&path_so_far))
            };
            let identity = associated.identity().ok_or_else(|| {
                Error::build(format!(
                    "associated entity [{}] defines no ID, cannot join",
                    associated.name()
                ))
            })?;

            if association.is_foreign_key() {
                let owner_id = owner.identity().ok_or_else(|| {
                    Error::build(format!(
                        "cannot join on entity [{}] that has no declared ID",
                        owner.name()
                    ))
                })?;

                if let Some(mapped_by) = association.mapped_by_property() {
                    let mapped = associated.property_by_name(mapped_by).ok_or_else(|| {
                        Error::build(format!(
                            "foreign key association with mappedBy references a property that doesn't exist [{mapped_by}] of entity: {}",
                            associated.name()
                        ))
                    })?;
                    state.push_join(&join_clause(
                        keyword,
                        &associated.table_name(),
                        &join_alias,
                        &alias,
                        &owner.quote(owner_id.persisted_name()),
                        &owner.quote(mapped.persisted_name()),
                    ));
                } else {
                    let table = join_table_name(&owner, property, association);
                    let [this_column, that_column] =
                        resolve_join_table_columns(&owner, &associated, property, association)?;
                    let table_alias = format!("{join_alias}{table}_");

                    state.push_join(&join_clause(
                        keyword,
                        &owner.quote(&table),
                        &table_alias,
                        &alias,
                        &owner.quote(owner_id.persisted_name()),
                        &owner.quote(&this_column),
                    ));
                    state.push_raw(" ");
                    state.push_join(&join_clause(
                        keyword,
                        &associated.table_name(),
                        &join_alias,
                        &table_alias,
                        &owner.quote(&that_column),
                        &owner.quote(identity.persisted_name()),
                    ));
                }
            } else {
                state.push_join(&join_clause(
                    keyword,
                    &associated.table_name(),
                    &join_alias,
                    &alias,
                    &owner.quote(property.persisted_name()),
                    &owner.quote(identity.persisted_name()),
                ));
            }

            state.apply(applied_key, join_alias.clone());
            join_alias
        };

        state.record_path(path_so_far.clone(), join_alias.clone(), Arc::clone(&associated));
        aliases.push(join_alias.clone());
        alias = join_alias;
        owner = associated;
    }

    Ok(aliases)
}

/// `<type><table> <alias> ON <onAlias>.<onColumn>=<alias>.<column>`
fn join_clause(
    keyword: &str, table: &str, alias: &str, on_alias: &str, on_column: &str, column: &str,
) -> String {
    format!("{keyword}{table} {alias} ON {on_alias}.{on_column}={alias}.{column}")
}

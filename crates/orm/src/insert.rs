use crate::ddl::{join_table_name, resolve_join_table_columns};
use crate::entity::PersistentEntity;
use crate::error::{Error, Result};
use crate::property::PersistentProperty;
use crate::query::QueryResult;

/// Compiles the INSERT for an entity.
///
/// Columns follow [`PersistentEntity::flattened_columns`] minus generated
/// properties; the binding paths in [`QueryResult::paths`] line up with the
/// placeholders.
///
/// # Errors
///
/// Returns a build error when the entity has no insertable column.
pub fn build_insert(entity: &PersistentEntity) -> Result<QueryResult> {
    let columns: Vec<_> =
        entity.flattened_columns().into_iter().filter(|c| !c.property.is_generated()).collect();
    if columns.is_empty() {
        return Err(Error::build(format!("entity {} has no insertable columns", entity.name())));
    }

    let names: Vec<&str> = columns.iter().map(|c| c.column.as_str()).collect();
    let values = vec!["?"; columns.len()];
    let query = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        entity.table_name(),
        names.join(","),
        values.join(",")
    );

    let result = QueryResult {
        query,
        bindings: (0..columns.len()).map(Into::into).collect(),
        parameter_types: columns.iter().map(|c| Some(c.property.data_type())).collect(),
        paths: columns.into_iter().map(|c| c.path).collect(),
    };
    tracing::debug!(
        table = entity.persisted_name(),
        sql = %result.query,
        param_count = result.paths.len(),
        "build_insert generated SQL"
    );
    Ok(result)
}

/// Compiles the insert of one row into an association's join table:
/// `INSERT INTO jt (owner_col,associated_col) VALUES (?, ?)`.
///
/// # Errors
///
/// Returns a build error unless `property` is a foreign-key association
/// mapped through a join table with two resolvable columns.
pub fn build_join_table_insert(
    entity: &PersistentEntity, property: &PersistentProperty,
) -> Result<QueryResult> {
    let association = property
        .as_association()
        .filter(|association| association.is_foreign_key_with_join_table())
        .ok_or_else(|| {
            Error::build(format!(
                "join table inserts can only be built for foreign key associations mapped with a join table, [{}] of entity {} is not one",
                property.name(),
                entity.name()
            ))
        })?;

    let associated = association.associated_entity();
    let table = join_table_name(entity, property, association);
    let columns = resolve_join_table_columns(entity, &associated, property, association)?;
    let query = format!(
        "INSERT INTO {} ({},{}) VALUES (?, ?)",
        entity.quote(&table),
        entity.quote(&columns[0]),
        entity.quote(&columns[1])
    );

    tracing::debug!(table = %table, sql = %query, param_count = 2, "build_join_table_insert generated SQL");
    Ok(QueryResult::text(query))
}

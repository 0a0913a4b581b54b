use crate::entity::PersistentEntity;
use crate::error::{Error, Result};
use crate::property::AutoPopulated;
use crate::query::QueryResult;

/// Compiles the UPDATE by identity for an entity:
/// `UPDATE t SET c1=?,c2=? WHERE id=?`.
///
/// Generated columns and creation timestamps are never rewritten. The
/// binding paths list the SET columns first and the identity last.
///
/// # Errors
///
/// Returns a build error when the entity declares no identity, or has no
/// updatable column.
pub fn build_update(entity: &PersistentEntity) -> Result<QueryResult> {
    entity.required_identity()?;

    let (identity, columns): (Vec<_>, Vec<_>) =
        entity.flattened_columns().into_iter().partition(|column| column.identity);
    let columns: Vec<_> = columns
        .into_iter()
        .filter(|c| {
            !c.property.is_generated() && c.property.auto_populated() != Some(&AutoPopulated::Created)
        })
        .collect();
    if columns.is_empty() {
        return Err(Error::build(format!("entity {} has no updatable columns", entity.name())));
    }

    let assignments: Vec<String> = columns.iter().map(|c| format!("{}=?", c.column)).collect();
    let predicates: Vec<String> = identity.iter().map(|c| format!("{}=?", c.column)).collect();
    let query = format!(
        "UPDATE {} SET {} WHERE {}",
        entity.table_name(),
        assignments.join(","),
        predicates.join(" AND ")
    );

    let bound: Vec<_> = columns.into_iter().chain(identity).collect();
    let result = QueryResult {
        query,
        bindings: (0..bound.len()).map(Into::into).collect(),
        parameter_types: bound.iter().map(|c| Some(c.property.data_type())).collect(),
        paths: bound.into_iter().map(|c| c.path).collect(),
    };
    tracing::debug!(
        table = entity.persisted_name(),
        sql = %result.query,
        param_count = result.paths.len(),
        "build_update generated SQL"
    );
    Ok(result)
}

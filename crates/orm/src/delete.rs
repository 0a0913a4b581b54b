use std::sync::Arc;

use crate::error::{Error, Result};
use crate::query::QueryResult;
use crate::select::{QueryModel, QueryState};

/// Compiles a DELETE for the model's root entity and criteria.
///
/// Columns are not qualified by an alias.
///
/// # Errors
///
/// Returns a build error for unknown property paths, or when the model
/// declares joins.
pub fn build_delete(model: &QueryModel) -> Result<QueryResult> {
    let entity = Arc::clone(model.entity());
    if !model.joins().is_empty() {
        return Err(Error::build(format!(
            "DELETE on entity [{}] cannot join associations",
            entity.name()
        )));
    }
    let mut state = QueryState::new(model, String::new());

    let mut sql = format!("DELETE FROM {}", entity.table_name());
    if let Some(condition) = state.where_clause()? {
        sql.push_str(" WHERE (");
        sql.push_str(&condition);
        sql.push(')');
    }

    let result = state.finish(sql);
    tracing::debug!(
        table = entity.persisted_name(),
        sql = %result.query,
        param_count = result.bindings.len(),
        "build_delete generated SQL"
    );
    Ok(result)
}

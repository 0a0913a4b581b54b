use sea_query::{BinOper, Expr, ExprTrait, SimpleExpr};

use crate::error::Result;
use crate::prepare::ParameterBinding;
use crate::query::in_expression_marker;
use crate::select::QueryState;

/// A predicate over entity property paths, comparing against query
/// parameters.
///
/// Paths are property names (`title`), embedded sub-properties
/// (`address.city`), or properties of joined associations (`author.name`).
/// Parameters reference the caller's argument array through a
/// [`ParameterBinding`]; no runtime values are captured here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    /// path = ?
    Eq(String, ParameterBinding),
    /// path != ?
    Ne(String, ParameterBinding),
    /// path > ?
    Gt(String, ParameterBinding),
    /// path >= ?
    Gte(String, ParameterBinding),
    /// path < ?
    Lt(String, ParameterBinding),
    /// path <= ?
    Lte(String, ParameterBinding),
    /// path LIKE ?
    Like(String, ParameterBinding),
    /// path IN (...), sized when the statement is prepared
    In(String, ParameterBinding),
    /// path IS NULL
    IsNull(String),
    /// path IS NOT NULL
    IsNotNull(String),
    /// Logical AND of multiple criteria
    And(Vec<Self>),
    /// Logical OR of multiple criteria
    Or(Vec<Self>),
    /// Logical NOT of a criterion
    Not(Box<Self>),
}

impl Criterion {
    /// `path = ?`
    pub fn eq(path: impl Into<String>, parameter: impl Into<ParameterBinding>) -> Self {
        Self::Eq(path.into(), parameter.into())
    }

    /// `path != ?`
    pub fn ne(path: impl Into<String>, parameter: impl Into<ParameterBinding>) -> Self {
        Self::Ne(path.into(), parameter.into())
    }

    /// `path > ?`
    pub fn gt(path: impl Into<String>, parameter: impl Into<ParameterBinding>) -> Self {
        Self::Gt(path.into(), parameter.into())
    }

    /// `path >= ?`
    pub fn gte(path: impl Into<String>, parameter: impl Into<ParameterBinding>) -> Self {
        Self::Gte(path.into(), parameter.into())
    }

    /// `path < ?`
    pub fn lt(path: impl Into<String>, parameter: impl Into<ParameterBinding>) -> Self {
        Self::Lt(path.into(), parameter.into())
    }

    /// `path <= ?`
    pub fn lte(path: impl Into<String>, parameter: impl Into<ParameterBinding>) -> Self {
        Self::Lte(path.into(), parameter.into())
    }

    /// `path LIKE ?`
    pub fn like(path: impl Into<String>, parameter: impl Into<ParameterBinding>) -> Self {
        Self::Like(path.into(), parameter.into())
    }

    /// `path IN (?, ...)`
    pub fn is_in(path: impl Into<String>, parameter: impl Into<ParameterBinding>) -> Self {
        Self::In(path.into(), parameter.into())
    }

    /// `path IS NULL`
    pub fn is_null(path: impl Into<String>) -> Self {
        Self::IsNull(path.into())
    }

    /// `path IS NOT NULL`
    pub fn is_not_null(path: impl Into<String>) -> Self {
        Self::IsNotNull(path.into())
    }

    /// Logical AND.
    #[must_use]
    pub const fn and(criteria: Vec<Self>) -> Self {
        Self::And(criteria)
    }

    /// Logical OR.
    #[must_use]
    pub const fn or(criteria: Vec<Self>) -> Self {
        Self::Or(criteria)
    }

    /// Logical NOT.
    #[must_use]
    pub fn not(criterion: Self) -> Self {
        Self::Not(Box::new(criterion))
    }

    /// Converts the criterion into a condition tree, registering one binding
    /// per placeholder in text order.
    pub(crate) fn into_expr(self, state: &mut QueryState) -> Result<SimpleExpr> {
        let expr = match self {
            Self::Eq(path, p) => state.column_expr(&path)?.eq(state.placeholder(&path, p)?),
            Self::Ne(path, p) => state.column_expr(&path)?.ne(state.placeholder(&path, p)?),
            Self::Gt(path, p) => state.column_expr(&path)?.gt(state.placeholder(&path, p)?),
            Self::Gte(path, p) => state.column_expr(&path)?.gte(state.placeholder(&path, p)?),
            Self::Lt(path, p) => state.column_expr(&path)?.lt(state.placeholder(&path, p)?),
            Self::Lte(path, p) => state.column_expr(&path)?.lte(state.placeholder(&path, p)?),
            Self::Like(path, p) => {
                let column = state.column_expr(&path)?;
                let placeholder = state.placeholder(&path, p)?;
                SimpleExpr::Binary(Box::new(column), BinOper::Like, Box::new(placeholder))
            }
            Self::In(path, p) => {
                let (column, _) = state.resolve_column(&path)?;
                let slot = state.push_binding(&path, p)?;
                Expr::cust(in_expression_marker(slot, &column))
            }
            Self::IsNull(path) => state.column_expr(&path)?.is_null(),
            Self::IsNotNull(path) => state.column_expr(&path)?.is_not_null(),
            Self::And(criteria) => fold(criteria, state, "1 = 1", |l, r| l.and(r))?,
            Self::Or(criteria) => fold(criteria, state, "1 = 2", |l, r| l.or(r))?,
            Self::Not(criterion) => criterion.into_expr(state)?.not(),
        };
        Ok(expr)
    }
}

fn fold(
    criteria: Vec<Criterion>, state: &mut QueryState, empty: &str,
    combine: fn(SimpleExpr, SimpleExpr) -> SimpleExpr,
) -> Result<SimpleExpr> {
    let mut combined: Option<SimpleExpr> = None;
    for criterion in criteria {
        let expr = criterion.into_expr(state)?;
        combined = Some(match combined {
            Some(left) => combine(left, expr),
            None => expr,
        });
    }
    Ok(combined.unwrap_or_else(|| Expr::cust(empty)))
}

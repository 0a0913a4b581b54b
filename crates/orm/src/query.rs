use sea_query::backend::{
    EscapeBuilder, OperLeftAssocDecider, PrecedenceDecider, QuotedBuilder, TableRefBuilder,
};
use sea_query::prepare::SqlWriter;
use sea_query::{BinOper, Oper, Quote, SimpleExpr, SubQueryStatement, Value};

use crate::prepare::ParameterBinding;
use crate::property::DataType;

/// Start of the reserved IN-expression token.
pub const IN_EXPRESSION_START: &str = "?$IN(";

/// End of the reserved IN-expression token.
pub const IN_EXPRESSION_END: char = ')';

/// Formats the IN-expression token for binding table `slot`, filtering on
/// `column`.
#[must_use]
pub fn in_expression_marker(slot: usize, column: &str) -> String {
    format!("{IN_EXPRESSION_START}{slot}:{column}{IN_EXPRESSION_END}")
}

/// Compiled SQL text and its ordered parameter binding table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// SQL text with `?` placeholders and IN-expression tokens.
    pub query: String,
    /// One entry per placeholder or IN token, in text order.
    pub bindings: Vec<ParameterBinding>,
    /// Declared data type for each binding, when known.
    pub parameter_types: Vec<Option<DataType>>,
    /// Entity property paths bound by the statement, in placeholder order.
    /// Filled for INSERT and UPDATE statements.
    pub paths: Vec<String>,
}

impl QueryResult {
    /// SQL text without bindings.
    #[must_use]
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Whether the text still holds an IN-expression token.
    #[must_use]
    pub fn has_in_expression(&self) -> bool {
        self.query.contains(IN_EXPRESSION_START)
    }
}

/// SQL dialect used to render condition trees: backtick identifiers and
/// unnumbered `?` placeholders.
pub struct QueryBuilder {
    /// Identifier quote.
    pub quote: Quote,
    /// Placeholder text.
    pub placeholder: &'static str,
    /// Whether placeholders carry their position.
    pub numbered: bool,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            quote: Quote::new(b'`'),
            placeholder: "?",
            numbered: false,
        }
    }
}

impl QueryBuilder {
    /// Renders a condition tree as SQL text.
    #[must_use]
    pub fn render(&self, condition: &SimpleExpr) -> String {
        let mut sql = String::new();
        sea_query::backend::QueryBuilder::prepare_simple_expr(self, condition, &mut sql);
        sql
    }
}

impl QuotedBuilder for QueryBuilder {
    fn quote(&self) -> Quote {
        self.quote
    }
}

impl EscapeBuilder for QueryBuilder {}

impl TableRefBuilder for QueryBuilder {}

impl OperLeftAssocDecider for QueryBuilder {
    fn well_known_left_associative(&self, op: &BinOper) -> bool {
        matches!(
            op,
            BinOper::And | BinOper::Or | BinOper::Add | BinOper::Sub | BinOper::Mul | BinOper::Mod
        )
    }
}

impl PrecedenceDecider for QueryBuilder {
    fn inner_expr_well_known_greater_precedence(
        &self, inner: &SimpleExpr, _outer_oper: &Oper,
    ) -> bool {
        // nested conditions are always parenthesized, operands never
        match inner {
            SimpleExpr::Binary(..) | SimpleExpr::Unary(..) => false,
            SimpleExpr::Custom(text) => !text.starts_with(IN_EXPRESSION_START),
            _ => true,
        }
    }
}

impl sea_query::backend::QueryBuilder for QueryBuilder {
    fn prepare_query_statement(&self, query: &SubQueryStatement, sql: &mut dyn SqlWriter) {
        match query {
            SubQueryStatement::SelectStatement(s) => self.prepare_select_statement(s, sql),
            SubQueryStatement::InsertStatement(s) => self.prepare_insert_statement(s, sql),
            SubQueryStatement::UpdateStatement(s) => self.prepare_update_statement(s, sql),
            SubQueryStatement::DeleteStatement(s) => self.prepare_delete_statement(s, sql),
            SubQueryStatement::WithStatement(s) => self.prepare_with_query(s, sql),
        }
    }

    fn prepare_value(&self, value: &Value, sql: &mut dyn SqlWriter) {
        sql.push_param(value.clone(), self);
    }

    fn placeholder(&self) -> (&str, bool) {
        (self.placeholder, self.numbered)
    }
}

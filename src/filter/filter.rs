use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOrderInfo};
use crate::database::command::{CommandParam, SqlCommand, SqlValue, TENANT_PARAM};
use crate::database::schema::is_valid_identifier;
use crate::tenant::ScopePredicate;

/// Structured SELECT over one table.
///
/// The tenant scope is a separate node ahead of the caller's where tree, so
/// it is always conjoined with (never replaced by) caller conditions.
pub struct Filter {
    table_name: String,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    scope: Option<ScopePredicate>,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        if !is_valid_identifier(&table_name) {
            return Err(FilterError::InvalidTableName(format!("Invalid table name format: {}", table_name)));
        }
        Ok(Self {
            table_name,
            where_data: None,
            order_data: vec![],
            scope: None,
        })
    }

    pub fn assign(&mut self, data: FilterData) -> Result<&mut Self, FilterError> {
        if let Some(where_clause) = data.where_clause {
            self.where_clause(where_clause)?;
        }
        if let Some(order) = data.order {
            self.order(order)?;
        }
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    pub fn order(&mut self, order_spec: Value) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(&order_spec)?;
        Ok(self)
    }

    /// Restrict the query to one tenant. Setting it again replaces the
    /// previous predicate, so a filter never carries two.
    pub fn scope(&mut self, predicate: ScopePredicate) -> &mut Self {
        self.scope = Some(predicate);
        self
    }

    pub fn to_sql(&self) -> Result<SqlCommand, FilterError> {
        let where_part = self.to_where_sql()?;
        let order_clause = FilterOrder::generate(&self.order_data);

        let query = [
            "SELECT *".to_string(),
            format!("FROM \"{}\"", self.table_name),
            Self::where_keyword(&where_part.text),
            order_clause,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Ok(SqlCommand::with_params(query, where_part.params))
    }

    pub fn to_count_sql(&self) -> Result<SqlCommand, FilterError> {
        let where_part = self.to_where_sql()?;
        let query = [
            format!("SELECT COUNT(*) AS count FROM \"{}\"", self.table_name),
            Self::where_keyword(&where_part.text),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
        Ok(SqlCommand::with_params(query, where_part.params))
    }

    pub fn to_exists_sql(&self) -> Result<SqlCommand, FilterError> {
        let inner = self.to_count_sql()?;
        let text = inner
            .text
            .replacen("SELECT COUNT(*) AS count FROM", "SELECT EXISTS (SELECT 1 FROM", 1)
            + ") AS exists";
        Ok(SqlCommand::with_params(text, inner.params))
    }

    /// Conditions only (without the `WHERE` keyword); empty when unfiltered
    pub fn to_where_sql(&self) -> Result<SqlCommand, FilterError> {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(scope) = &self.scope {
            params.push(CommandParam::named(TENANT_PARAM, SqlValue::tenant(&scope.tenant)));
            clauses.push(format!("\"{}\" = ${}", scope.column, params.len()));
        }

        if let Some(where_data) = &self.where_data {
            if !where_data.is_null() {
                let (sql, where_params) = FilterWhere::generate(where_data, params.len())?;
                clauses.push(if self.scope.is_some() { format!("({})", sql) } else { sql });
                params.extend(where_params);
            }
        }

        Ok(SqlCommand::with_params(clauses.join(" AND "), params))
    }

    fn where_keyword(conditions: &str) -> String {
        if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions)
        }
    }
}

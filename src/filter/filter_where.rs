use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};
use crate::database::command::{CommandParam, SqlValue};
use crate::database::schema::is_valid_identifier;

const MAX_NESTED_DEPTH: usize = 8;

/// Renders the JSON where DSL into SQL with positional parameters.
///
/// Placeholders continue from `starting_param_index`, so the output can be
/// appended after parameters that were already bound (the tenant predicate).
pub struct FilterWhere {
    param_values: Vec<CommandParam>,
    param_offset: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_offset: starting_param_index,
        }
    }

    pub fn generate(where_data: &Value, starting_param_index: usize) -> Result<(String, Vec<CommandParam>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        let sql = filter_where.build(where_data, 0)?;
        Ok((sql, filter_where.param_values))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            Value::String(_) => Err(FilterError::InvalidWhereClause(
                "Raw SQL predicates are not accepted by the structured filter".to_string(),
            )),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn build(&mut self, where_data: &Value, depth: usize) -> Result<String, FilterError> {
        if depth > MAX_NESTED_DEPTH {
            return Err(FilterError::NestingTooDeep(MAX_NESTED_DEPTH));
        }

        let obj = match where_data {
            Value::Null => return Ok("1=1".to_string()),
            Value::Object(obj) => obj,
            _ => return Err(FilterError::InvalidWhereClause("Unsupported WHERE format".to_string())),
        };

        let mut sql_conditions = vec![];
        for (key, value) in obj {
            if key.starts_with('$') {
                sql_conditions.push(self.parse_logical_operator(key, value, depth)?);
            } else {
                for condition in Self::parse_field_condition(key, value)? {
                    sql_conditions.push(self.build_sql_condition(&condition)?);
                }
            }
        }

        if sql_conditions.is_empty() {
            Ok("1=1".to_string())
        } else {
            Ok(sql_conditions.join(" AND "))
        }
    }

    fn parse_logical_operator(&mut self, op: &str, value: &Value, depth: usize) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    return Ok(if op == "$and" { "1=1" } else { "1=0" }.to_string());
                }
                let mut sql_parts = Vec::with_capacity(arr.len());
                for v in arr {
                    sql_parts.push(format!("({})", self.build(v, depth + 1)?));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", sql_parts.join(joiner)))
            }
            "$not" => Ok(format!("NOT ({})", self.build(value, depth + 1)?)),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(field: &str, value: &Value) -> Result<Vec<FilterWhereInfo>, FilterError> {
        if !is_valid_identifier(field) {
            return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", field)));
        }

        if let Value::Object(obj) = value {
            obj.iter()
                .map(|(op_key, op_val)| {
                    Ok(FilterWhereInfo {
                        column: field.to_string(),
                        operator: Self::map_operator(op_key)?,
                        data: op_val.clone(),
                    })
                })
                .collect()
        } else {
            // Implicit equality: { field: value }
            Ok(vec![FilterWhereInfo {
                column: field.to_string(),
                operator: FilterOp::Eq,
                data: value.clone(),
            }])
        }
    }

    fn map_operator(op_key: &str) -> Result<FilterOp, FilterError> {
        Ok(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$in" => FilterOp::In,
            "$between" => FilterOp::Between,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let quoted_column = format!("\"{}\"", condition.column);
        let data = &condition.data;
        match condition.operator {
            FilterOp::Eq => {
                if data.is_null() {
                    Ok(format!("{} IS NULL", quoted_column))
                } else {
                    Ok(format!("{} = {}", quoted_column, self.param(data)))
                }
            }
            FilterOp::Ne => {
                if data.is_null() {
                    Ok(format!("{} IS NOT NULL", quoted_column))
                } else {
                    Ok(format!("{} <> {}", quoted_column, self.param(data)))
                }
            }
            FilterOp::Gt => Ok(format!("{} > {}", quoted_column, self.param(data))),
            FilterOp::Gte => Ok(format!("{} >= {}", quoted_column, self.param(data))),
            FilterOp::Lt => Ok(format!("{} < {}", quoted_column, self.param(data))),
            FilterOp::Lte => Ok(format!("{} <= {}", quoted_column, self.param(data))),
            FilterOp::Like => Ok(format!("{} LIKE {}", quoted_column, self.param(data))),
            FilterOp::ILike => Ok(format!("{} ILIKE {}", quoted_column, self.param(data))),
            FilterOp::In => {
                if let Value::Array(values) = data {
                    if values.is_empty() {
                        return Ok("1=0".to_string());
                    }
                    let params: Vec<String> = values.iter().map(|v| self.param(v)).collect();
                    Ok(format!("{} IN ({})", quoted_column, params.join(", ")))
                } else {
                    Ok(format!("{} = {}", quoted_column, self.param(data)))
                }
            }
            FilterOp::Between => match data {
                Value::Array(values) if values.len() == 2 => Ok(format!(
                    "{} BETWEEN {} AND {}",
                    quoted_column,
                    self.param(&values[0]),
                    self.param(&values[1])
                )),
                _ => Err(FilterError::InvalidOperatorData(
                    "$between requires array with 2 values".to_string(),
                )),
            },
        }
    }

    fn param(&mut self, value: &Value) -> String {
        self.param_values.push(CommandParam::positional(SqlValue::from_json(value)));
        format!("${}", self.param_offset + self.param_values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn implicit_equality_and_null() {
        let (sql, params) = FilterWhere::generate(&json!({ "id": 4, "name": null }), 0).unwrap();
        assert_eq!(sql, "\"id\" = $1 AND \"name\" IS NULL");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].value, SqlValue::BigInt(4));
    }

    #[test]
    fn placeholders_continue_from_offset() {
        let (sql, params) = FilterWhere::generate(&json!({ "price": { "$gt": 10, "$lte": 20 } }), 1).unwrap();
        assert_eq!(sql, "\"price\" > $2 AND \"price\" <= $3");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn logical_operators_are_parenthesized() {
        let where_data = json!({
            "$or": [ { "name": "a" }, { "name": { "$ilike": "b%" } } ]
        });
        let (sql, params) = FilterWhere::generate(&where_data, 1).unwrap();
        assert_eq!(sql, "((\"name\" = $2) OR (\"name\" ILIKE $3))");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, params) = FilterWhere::generate(&json!({ "id": { "$in": [] } }), 0).unwrap();
        assert_eq!(sql, "1=0");
        assert!(params.is_empty());
    }

    #[test]
    fn rejects_raw_sql_and_bad_columns() {
        assert!(FilterWhere::validate(&json!("1=1 OR 1=1")).is_err());
        assert!(matches!(
            FilterWhere::generate(&json!({ "id\" OR 1=1 --": 1 }), 0),
            Err(FilterError::InvalidColumn(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&json!({ "id": { "$regex": "x" } }), 0),
            Err(FilterError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&json!({ "name": { "$text": "1=1" } }), 0),
            Err(FilterError::UnsupportedOperator(_))
        ));
    }
}

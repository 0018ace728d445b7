use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{FromRow, Postgres};

use crate::tenant::{TenantContext, TenantId};

/// Name of the parameter that carries the tenant id in generated commands
pub const TENANT_PARAM: &str = "tenant_id";

/// Typed value bound to a positional `$n` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Json(Value),
    /// Tenant id of the executing request; `None` binds an integer NULL so
    /// that `"tenant_id" = $n` matches nothing.
    Tenant(Option<TenantId>),
}

impl SqlValue {
    pub fn tenant(ctx: &TenantContext) -> Self {
        SqlValue::Tenant(ctx.get())
    }

    /// Convert a JSON filter operand into a bindable value
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::BigInt(i)
                } else if let Some(u) = n.as_u64() {
                    // Postgres doesn't have u64; cast down if safe
                    SqlValue::BigInt(i64::try_from(u).unwrap_or(i64::MAX))
                } else if let Some(f) = n.as_f64() {
                    SqlValue::Float(f)
                } else {
                    SqlValue::Text(n.to_string())
                }
            }
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlValue::Json(value.clone()),
        }
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<Decimal> for SqlValue {
    fn from(value: Decimal) -> Self {
        SqlValue::Decimal(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandParam {
    pub name: Option<String>,
    pub value: SqlValue,
}

impl CommandParam {
    pub fn positional(value: SqlValue) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: SqlValue) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}

/// Command text plus its parameters, in placeholder order (`$1` is `params[0]`)
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCommand {
    pub text: String,
    pub params: Vec<CommandParam>,
}

impl SqlCommand {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(text: impl Into<String>, params: Vec<CommandParam>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }

    /// Append a positional parameter; the caller references it as `$n`
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(CommandParam::positional(value.into()));
        self
    }

    pub fn bind_named(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.params.push(CommandParam::named(name, value.into()));
        self
    }

    /// Placeholder the next appended parameter will occupy
    pub fn next_placeholder(&self) -> String {
        format!("${}", self.params.len() + 1)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut CommandParam> {
        self.params.iter_mut().find(|p| p.is_named(name))
    }

    #[cfg(test)]
    pub(crate) fn param(&self, name: &str) -> Option<&CommandParam> {
        self.params.iter().find(|p| p.is_named(name))
    }
}

pub(crate) fn bind_param_query<'q>(
    q: sqlx::query::Query<'q, Postgres, PgArguments>,
    v: &'q SqlValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match v {
        SqlValue::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        SqlValue::Bool(b) => q.bind(*b),
        SqlValue::Int(i) => q.bind(*i),
        SqlValue::BigInt(i) => q.bind(*i),
        SqlValue::Float(f) => q.bind(*f),
        SqlValue::Decimal(d) => q.bind(*d),
        SqlValue::Text(s) => q.bind(s.as_str()),
        SqlValue::Json(j) => q.bind(j.clone()),
        SqlValue::Tenant(t) => q.bind(t.map(TenantId::value)),
    }
}

pub(crate) fn bind_param_query_as<'q, O>(
    q: sqlx::query::QueryAs<'q, Postgres, O, PgArguments>,
    v: &'q SqlValue,
) -> sqlx::query::QueryAs<'q, Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, PgRow>,
{
    match v {
        SqlValue::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        SqlValue::Bool(b) => q.bind(*b),
        SqlValue::Int(i) => q.bind(*i),
        SqlValue::BigInt(i) => q.bind(*i),
        SqlValue::Float(f) => q.bind(*f),
        SqlValue::Decimal(d) => q.bind(*d),
        SqlValue::Text(s) => q.bind(s.as_str()),
        SqlValue::Json(j) => q.bind(j.clone()),
        SqlValue::Tenant(t) => q.bind(t.map(TenantId::value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_become_bigints() {
        assert_eq!(SqlValue::from_json(&json!(5)), SqlValue::BigInt(5));
        assert_eq!(SqlValue::from_json(&json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(SqlValue::from_json(&json!("x")), SqlValue::Text("x".into()));
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
    }

    #[test]
    fn next_placeholder_follows_param_count() {
        let cmd = SqlCommand::new("SELECT * FROM \"products\" WHERE \"id\" = $1").bind(4);
        assert_eq!(cmd.next_placeholder(), "$2");
    }

    #[test]
    fn finds_named_params() {
        let mut cmd = SqlCommand::new("SELECT 1")
            .bind(1)
            .bind_named(TENANT_PARAM, SqlValue::Tenant(Some(TenantId(3))));
        assert!(cmd.param(TENANT_PARAM).is_some());
        assert!(cmd.param("other").is_none());
        cmd.param_mut(TENANT_PARAM).unwrap().value = SqlValue::Tenant(None);
        assert_eq!(cmd.params[1].value, SqlValue::Tenant(None));
    }
}

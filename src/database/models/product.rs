use std::any::Any;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::FromRow;

use crate::database::command::SqlValue;
use crate::database::entity::{Entity, EntityDescriptor, ScopedEntity};
use crate::tenant::TenantId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i32,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub tenant_id: i32,
}

impl Product {
    /// A product about to be inserted; the tenant is stamped on save
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: 0,
            name: name.into(),
            price,
            tenant_id: 0,
        }
    }
}

impl Entity for Product {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::scoped::<Product>("products", "id", &["id", "name", "price", "tenant_id"])
    }

    fn key(&self) -> SqlValue {
        SqlValue::Int(self.id)
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("name", SqlValue::Text(self.name.clone())),
            ("price", SqlValue::Decimal(self.price)),
            ("tenant_id", SqlValue::Int(self.tenant_id)),
        ]
    }

    fn hydrate(&mut self, row: &PgRow) -> Result<(), sqlx::Error> {
        *self = Product::from_row(row)?;
        Ok(())
    }

    fn as_scoped_mut(&mut self) -> Option<&mut dyn ScopedEntity> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl ScopedEntity for Product {
    fn tenant_id(&self) -> TenantId {
        TenantId(self.tenant_id)
    }

    fn set_tenant_id(&mut self, tenant_id: TenantId) {
        self.tenant_id = tenant_id.value();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_camel_case_with_numeric_price() {
        let product = Product {
            id: 3,
            name: "Desk".to_string(),
            price: Decimal::new(1999, 2),
            tenant_id: 2,
        };
        assert_eq!(
            serde_json::to_value(&product).unwrap(),
            json!({ "id": 3, "name": "Desk", "price": 19.99, "tenantId": 2 })
        );
    }

    #[test]
    fn descriptor_is_scoped_on_tenant_id() {
        let descriptor = Product::descriptor();
        assert_eq!(descriptor.table, "products");
        assert_eq!(descriptor.tenant_column, Some("tenant_id"));
        assert!(descriptor.columns.contains(&"tenant_id"));
    }
}

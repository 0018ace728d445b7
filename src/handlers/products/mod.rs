// handlers/products/mod.rs - Tenant-scoped product CRUD
//
// Every handler here sits behind the tenant resolver and receives the
// request's TenantContext from extensions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::database::models::Product;

pub mod create; // POST /api/products
pub mod delete; // DELETE /api/products/:id
pub mod get; // GET /api/products/:id
pub mod list; // GET /api/products
pub mod update; // PUT /api/products/:id

pub use create::product_create;
pub use delete::product_delete;
pub use get::product_get;
pub use list::product_list;
pub use update::product_update;

/// Body of create and update requests. Unknown fields, `tenantId`
/// included, are ignored.
#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    #[validate(
        required(message = "name is required"),
        length(max = 100, message = "name must be at most 100 characters"),
        custom(function = "not_blank")
    )]
    pub name: Option<String>,

    #[validate(required(message = "price is required"), custom(function = "positive"))]
    pub price: Option<Decimal>,
}

impl ProductRequest {
    /// Validated name and price; call after `validate()`
    fn into_parts(self) -> Option<(String, Decimal)> {
        Some((self.name?.trim().to_string(), self.price?))
    }
}

#[derive(Debug, Serialize)]
pub struct ProductList {
    pub products: Vec<Product>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("name must not be blank".into());
        return Err(err);
    }
    Ok(())
}

fn positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = ValidationError::new("positive");
        err.message = Some("price must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

fn location(product: &Product) -> String {
    format!("/api/products/{}", product.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> ProductRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn accepts_valid_request_and_ignores_tenant_id() {
        let req = request(json!({ "name": "Chair", "price": 10, "tenantId": 99 }));
        assert!(req.validate().is_ok());
        assert_eq!(req.into_parts(), Some(("Chair".to_string(), Decimal::from(10))));
    }

    #[test]
    fn rejects_blank_and_long_names() {
        let errs = request(json!({ "name": "   ", "price": 1 })).validate().unwrap_err();
        assert!(errs.field_errors().contains_key("name"));

        let errs = request(json!({ "name": "x".repeat(101), "price": 1 })).validate().unwrap_err();
        assert!(errs.field_errors().contains_key("name"));

        assert!(request(json!({ "name": "x".repeat(100), "price": 1 })).validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_and_missing_prices() {
        for body in [
            json!({ "name": "Chair", "price": 0 }),
            json!({ "name": "Chair", "price": -5.5 }),
            json!({ "name": "Chair" }),
        ] {
            let errs = request(body).validate().unwrap_err();
            assert!(errs.field_errors().contains_key("price"));
        }
    }
}

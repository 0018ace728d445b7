// handlers/products/create.rs - POST /api/products handler

use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use validator::Validate;

use super::{location, ProductRequest};
use crate::app::AppState;
use crate::database::models::Product;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenant::TenantContext;

/// Creates a product owned by the requesting tenant. The tenant id is
/// stamped by the write interceptor, never read from the body.
pub async fn product_create(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> ApiResult<Product> {
    let Json(request) = payload?;
    request.validate()?;
    let (name, price) = request
        .into_parts()
        .ok_or_else(|| ApiError::validation_error("Validation failed", None))?;

    let mut session = state.db.session(tenant);
    session.add(Product::new(name, price));
    let mut committed = session.save_changes().await?;

    let product = committed
        .inserted::<Product>()
        .pop()
        .ok_or_else(|| ApiError::internal_server_error("Insert returned no row"))?;

    tracing::info!("Product {} created for tenant {}", product.id, product.tenant_id);
    let location = location(&product);
    Ok(ApiResponse::created(product, location))
}

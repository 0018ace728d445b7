// handlers/products/update.rs - PUT /api/products/:id handler

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Extension, Json,
};
use validator::Validate;

use super::ProductRequest;
use crate::app::AppState;
use crate::database::models::Product;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenant::TenantContext;

/// Replaces name and price. The owning tenant never changes; a product
/// outside the caller's tenant matches no row and yields 404.
pub async fn product_update(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    id: Result<Path<i32>, PathRejection>,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> ApiResult<Product> {
    let Path(id) = id?;
    let Json(request) = payload?;
    request.validate()?;
    let (name, price) = request
        .into_parts()
        .ok_or_else(|| ApiError::validation_error("Validation failed", None))?;

    let mut session = state.db.session(tenant);
    session.update(Product {
        id,
        ..Product::new(name, price)
    });
    let mut committed = session.save_changes().await?;

    committed
        .updated::<Product>()
        .pop()
        .map(ApiResponse::success)
        .ok_or_else(|| ApiError::not_found(format!("Product {} not found", id)))
}

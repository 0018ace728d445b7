// handlers/products/get.rs - GET /api/products/:id handler

use axum::{
    extract::{rejection::PathRejection, Path, State},
    Extension,
};

use crate::app::AppState;
use crate::database::models::Product;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenant::TenantContext;

/// Products of other tenants are indistinguishable from missing ones
pub async fn product_get(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    id: Result<Path<i32>, PathRejection>,
) -> ApiResult<Product> {
    let Path(id) = id?;
    let session = state.db.session(tenant);

    session
        .repository::<Product>()
        .find(i64::from(id))
        .await?
        .map(ApiResponse::success)
        .ok_or_else(|| ApiError::not_found(format!("Product {} not found", id)))
}

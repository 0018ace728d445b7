// handlers/products/delete.rs - DELETE /api/products/:id handler

use axum::{
    extract::{rejection::PathRejection, Path, State},
    Extension,
};

use crate::app::AppState;
use crate::database::models::Product;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenant::TenantContext;

pub async fn product_delete(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    id: Result<Path<i32>, PathRejection>,
) -> ApiResult<()> {
    let Path(id) = id?;
    let mut session = state.db.session(tenant);

    let product = session
        .repository::<Product>()
        .find(i64::from(id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Product {} not found", id)))?;

    session.remove(product);
    let committed = session.save_changes().await?;
    if committed.deleted() == 0 {
        return Err(ApiError::not_found(format!("Product {} not found", id)));
    }
    Ok(ApiResponse::<()>::no_content())
}

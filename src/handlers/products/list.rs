// handlers/products/list.rs - GET /api/products handler

use axum::{extract::State, Extension};

use super::ProductList;
use crate::app::AppState;
use crate::database::models::Product;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenant::TenantContext;

pub async fn product_list(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<ProductList> {
    let session = state.db.session(tenant);
    let products = session
        .repository::<Product>()
        .select_any(FilterData::default().ordered("id"))
        .await?;

    Ok(ApiResponse::success(ProductList { products }))
}

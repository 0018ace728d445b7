use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::database::Database;
use crate::handlers::{products, public};
use crate::middleware::{tenant_resolver_middleware, TenantResolver};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub tenant_header: String,
}

impl AppState {
    pub fn new(db: Database, resolver: &TenantResolver) -> Self {
        Self {
            db,
            tenant_header: resolver.header_name().to_string(),
        }
    }
}

pub fn router(state: AppState, resolver: TenantResolver, config: &AppConfig) -> Router {
    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        // Tenant-scoped API
        .merge(api_routes(resolver))
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes(resolver: TenantResolver) -> Router<AppState> {
    Router::new()
        .route(
            "/api/products",
            get(products::product_list).post(products::product_create),
        )
        .route(
            "/api/products/:id",
            get(products::product_get)
                .put(products::product_update)
                .delete(products::product_delete),
        )
        // Only matched routes resolve a tenant; unknown paths stay 404
        .route_layer(from_fn_with_state(resolver, tenant_resolver_middleware))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if !config.security.enable_cors {
        return CorsLayer::new();
    }
    if crate::is_development!() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
}

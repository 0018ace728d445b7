use axum::{
    extract::{Request, State},
    http::{header::InvalidHeaderName, HeaderMap, HeaderName},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::tenant::{TenantContext, TenantId};

/// Resolves the tenant of each `/api` request from a request header
#[derive(Debug, Clone)]
pub struct TenantResolver {
    header: HeaderName,
    /// Header name as configured, for error messages
    display_name: String,
}

impl TenantResolver {
    pub fn new(header_name: &str) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            header: HeaderName::from_bytes(header_name.as_bytes())?,
            display_name: header_name.to_string(),
        })
    }

    pub fn header_name(&self) -> &str {
        &self.display_name
    }

    /// Missing header, non-UTF-8 values and non-integers are all rejected
    pub fn resolve(&self, headers: &HeaderMap) -> Result<TenantContext, ApiError> {
        let value = headers
            .get(&self.header)
            .ok_or_else(|| ApiError::bad_request(format!("{} is required", self.display_name)))?;

        let invalid = || ApiError::bad_request(format!("{} must be a valid integer", self.display_name));
        let tenant_id: TenantId = value
            .to_str()
            .map_err(|_| invalid())?
            .parse()
            .map_err(|_| invalid())?;

        let mut ctx = TenantContext::unset();
        ctx.set(tenant_id);
        Ok(ctx)
    }
}

/// Middleware that stores the request's [`TenantContext`] in its extensions.
/// Downstream handlers never run when the header is missing or invalid.
pub async fn tenant_resolver_middleware(
    State(resolver): State<TenantResolver>,
    mut request: Request,
    next: Next,
) -> Response {
    match resolver.resolve(request.headers()) {
        Ok(ctx) => {
            tracing::debug!("Resolved tenant {:?} for {} {}", ctx.get(), request.method(), request.uri().path());
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => {
            tracing::debug!("Tenant resolution failed for {}: {}", request.uri().path(), err);
            err.into_response()
        }
    }
}

pub mod response;
pub mod tenant_resolver;

pub use response::{ApiResponse, ApiResult};
pub use tenant_resolver::{tenant_resolver_middleware, TenantResolver};

pub mod context;
pub mod registrar;

pub use context::{TenantContext, TenantId};
pub use registrar::{AutoScopeRegistrar, ScopePredicate, ScopeRegistry, TenantFilter};

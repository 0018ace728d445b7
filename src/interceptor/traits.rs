use thiserror::Error;

use crate::database::command::SqlCommand;
use crate::database::session::TrackedEntity;
use crate::tenant::TenantContext;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InterceptError {
    #[error("Cannot save {entity}: no tenant resolved for this request")]
    TenantUnset { entity: &'static str },

    #[error("Entity {entity} declares a tenant column but does not expose ScopedEntity")]
    CapabilityMismatch { entity: &'static str },
}

/// Runs on each command immediately before it is sent to the database
pub trait CommandInterceptor: Send + Sync {
    /// Interceptor name for logging and debugging
    fn name(&self) -> &'static str;

    fn command_executing(&self, command: &mut SqlCommand, ctx: &TenantContext);
}

/// Runs once per commit, before any command of the unit of work is built
pub trait SaveChangesInterceptor: Send + Sync {
    /// Interceptor name for logging and debugging
    fn name(&self) -> &'static str;

    fn saving_changes(&self, entries: &mut [TrackedEntity], ctx: &TenantContext) -> Result<(), InterceptError>;
}

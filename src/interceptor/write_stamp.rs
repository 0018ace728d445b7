use super::traits::{InterceptError, SaveChangesInterceptor};
use crate::database::session::{EntityState, TrackedEntity};
use crate::tenant::TenantContext;

/// Stamps the request's tenant onto every scoped entity staged for insert,
/// overwriting whatever the caller put there.
#[derive(Debug, Default)]
pub struct TenantWriteInterceptor;

impl SaveChangesInterceptor for TenantWriteInterceptor {
    fn name(&self) -> &'static str {
        "TenantWriteInterceptor"
    }

    fn saving_changes(&self, entries: &mut [TrackedEntity], ctx: &TenantContext) -> Result<(), InterceptError> {
        for entry in entries.iter_mut().filter(|e| e.state == EntityState::Added) {
            let entity_name = entry.descriptor.name;
            let declared_scoped = entry.descriptor.is_scoped();

            let Some(scoped) = entry.entity.as_scoped_mut() else {
                if declared_scoped {
                    return Err(InterceptError::CapabilityMismatch { entity: entity_name });
                }
                continue;
            };

            let tenant = ctx.get().ok_or(InterceptError::TenantUnset { entity: entity_name })?;
            let previous = scoped.tenant_id();
            if previous != tenant {
                tracing::debug!("Stamping tenant {} on {} (was {})", tenant, entity_name, previous);
            }
            scoped.set_tenant_id(tenant);
        }
        Ok(())
    }
}

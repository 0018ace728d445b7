pub mod command_text;
pub mod traits;
pub mod write_stamp;

use std::sync::Arc;

pub use command_text::{Rewrite, TenantCommandInterceptor};
pub use traits::{CommandInterceptor, InterceptError, SaveChangesInterceptor};
pub use write_stamp::TenantWriteInterceptor;

use crate::database::command::SqlCommand;
use crate::database::session::TrackedEntity;
use crate::tenant::TenantContext;

/// Ordered interceptors shared by every session of a [`crate::database::Database`]
#[derive(Clone, Default)]
pub struct InterceptorChain {
    command: Vec<Arc<dyn CommandInterceptor>>,
    save: Vec<Arc<dyn SaveChangesInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command(mut self, interceptor: impl CommandInterceptor + 'static) -> Self {
        self.command.push(Arc::new(interceptor));
        self
    }

    pub fn with_save(mut self, interceptor: impl SaveChangesInterceptor + 'static) -> Self {
        self.save.push(Arc::new(interceptor));
        self
    }

    pub fn command_executing(&self, command: &mut SqlCommand, ctx: &TenantContext) {
        for interceptor in &self.command {
            interceptor.command_executing(command, ctx);
        }
    }

    pub fn saving_changes(&self, entries: &mut [TrackedEntity], ctx: &TenantContext) -> Result<(), InterceptError> {
        for interceptor in &self.save {
            interceptor.saving_changes(entries, ctx)?;
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.save
            .iter()
            .map(|i| i.name())
            .chain(self.command.iter().map(|i| i.name()))
            .collect()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain").field("interceptors", &self.names()).finish()
    }
}

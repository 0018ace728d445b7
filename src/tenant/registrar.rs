use std::any::TypeId;
use std::collections::HashMap;

use crate::database::entity::EntityDescriptor;
use crate::database::schema::{SchemaError, SchemaModel};
use crate::tenant::TenantContext;

/// Implicit `tenant_column = <current tenant>` predicate for one entity type.
///
/// Holds no tenant value; [`TenantFilter::predicate`] reads it from the
/// session's context every time a query is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantFilter {
    pub entity: &'static str,
    pub table: &'static str,
    pub column: &'static str,
}

impl TenantFilter {
    pub fn predicate(&self, ctx: &TenantContext) -> ScopePredicate {
        ScopePredicate {
            column: self.column,
            tenant: *ctx,
        }
    }
}

/// A tenant filter bound to one request's context, ready to be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopePredicate {
    pub column: &'static str,
    pub tenant: TenantContext,
}

/// Registration table of tenant filters, keyed by entity type
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    filters: HashMap<TypeId, TenantFilter>,
    tables: HashMap<&'static str, &'static str>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the filter for a scoped type. Returns `Ok(false)` when the
    /// type is unscoped or already registered.
    pub fn register(&mut self, descriptor: &EntityDescriptor) -> Result<bool, SchemaError> {
        let Some(column) = descriptor.tenant_column else {
            return Ok(false);
        };
        if self.filters.contains_key(&descriptor.type_id) {
            return Ok(false);
        }
        if let Some(existing) = self.tables.get(descriptor.table) {
            if *existing != column {
                return Err(SchemaError::ConflictingScope {
                    table: descriptor.table,
                    first: existing,
                    second: column,
                });
            }
        }

        self.tables.insert(descriptor.table, column);
        self.filters.insert(
            descriptor.type_id,
            TenantFilter {
                entity: descriptor.name,
                table: descriptor.table,
                column,
            },
        );
        Ok(true)
    }

    pub fn filter_for(&self, type_id: TypeId) -> Option<&TenantFilter> {
        self.filters.get(&type_id)
    }

    /// Tenant column of a scoped table, matched case-insensitively
    pub fn scoped_table(&self, table: &str) -> Option<&'static str> {
        self.tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
            .map(|(_, column)| *column)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// Attaches a tenant filter to every scoped type in the schema model
pub struct AutoScopeRegistrar;

impl AutoScopeRegistrar {
    pub fn register(model: &SchemaModel) -> Result<ScopeRegistry, SchemaError> {
        let mut registry = ScopeRegistry::new();

        // Declared collections first, then everything reachable through relationships
        let candidates = model.collections().iter().chain(model.entity_types().iter());
        for descriptor in candidates {
            if registry.register(descriptor)? {
                tracing::info!(
                    "Tenant filter registered: {} ({}.{})",
                    descriptor.name,
                    descriptor.table,
                    descriptor.tenant_column.unwrap_or_default()
                );
            } else if descriptor.is_scoped() {
                tracing::debug!("Tenant filter already registered for {}", descriptor.name);
            }
        }

        tracing::info!("Tenant scoping active for {} entity types", registry.len());
        Ok(registry)
    }
}

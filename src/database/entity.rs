use std::any::{Any, TypeId};
use std::fmt;

use sqlx::postgres::PgRow;

use crate::database::command::SqlValue;
use crate::tenant::TenantId;

/// Static description of a persisted entity type, used to build the schema model
#[derive(Clone, Copy)]
pub struct EntityDescriptor {
    pub type_id: TypeId,
    pub name: &'static str,
    pub table: &'static str,
    pub key_column: &'static str,
    pub columns: &'static [&'static str],
    /// Set only for types implementing [`ScopedEntity`]
    pub tenant_column: Option<&'static str>,
    /// Entity types reachable from this one through relationships
    pub related: fn() -> Vec<EntityDescriptor>,
}

fn no_relations() -> Vec<EntityDescriptor> {
    Vec::new()
}

impl EntityDescriptor {
    pub fn new<T: Entity>(table: &'static str, key_column: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            table,
            key_column,
            columns,
            tenant_column: None,
            related: no_relations,
        }
    }

    /// Descriptor for a tenant-scoped type. Only [`ScopedEntity`] types can
    /// produce one, so the capability and the declared column never disagree.
    pub fn scoped<T: ScopedEntity>(
        table: &'static str,
        key_column: &'static str,
        columns: &'static [&'static str],
    ) -> Self {
        Self {
            tenant_column: Some(T::tenant_column()),
            ..Self::new::<T>(table, key_column, columns)
        }
    }

    pub fn with_related(mut self, related: fn() -> Vec<EntityDescriptor>) -> Self {
        self.related = related;
        self
    }

    pub fn is_scoped(&self) -> bool {
        self.tenant_column.is_some()
    }
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("tenant_column", &self.tenant_column)
            .finish()
    }
}

impl PartialEq for EntityDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

/// A persisted row type that can be staged in a tenant session
pub trait Entity: Any + Send + Sync + fmt::Debug {
    fn descriptor() -> EntityDescriptor
    where
        Self: Sized;

    /// Primary key value
    fn key(&self) -> SqlValue;

    /// Writable column values, excluding the generated key
    fn values(&self) -> Vec<(&'static str, SqlValue)>;

    /// Replace this value with the row the database returned
    fn hydrate(&mut self, row: &PgRow) -> Result<(), sqlx::Error>;

    fn as_scoped_mut(&mut self) -> Option<&mut dyn ScopedEntity> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Capability of entities whose rows belong to a tenant
pub trait ScopedEntity: Entity {
    fn tenant_column() -> &'static str
    where
        Self: Sized,
    {
        "tenant_id"
    }

    fn tenant_id(&self) -> TenantId;

    fn set_tenant_id(&mut self, tenant_id: TenantId);
}

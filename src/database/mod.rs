pub mod command;
pub mod entity;
pub mod manager;
pub mod models;
pub mod query_builder;
pub mod repository;
pub mod schema;
pub mod session;

pub use command::{CommandParam, SqlCommand, SqlValue, TENANT_PARAM};
pub use entity::{Entity, EntityDescriptor, ScopedEntity};
pub use manager::{Database, DatabaseError};
pub use repository::Repository;
pub use schema::{SchemaBuilder, SchemaError, SchemaModel};
pub use session::{Committed, EntityState, TenantSession, TrackedEntity};

use std::time::Instant;

use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{FromRow, Postgres, Row};

use crate::database::command::{bind_param_query, bind_param_query_as, CommandParam, SqlCommand, SqlValue};
use crate::database::entity::{Entity, EntityDescriptor};
use crate::database::manager::{Database, DatabaseError};
use crate::database::repository::Repository;
use crate::tenant::{ScopePredicate, TenantContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
}

/// One staged change in a unit of work
#[derive(Debug)]
pub struct TrackedEntity {
    pub state: EntityState,
    pub descriptor: EntityDescriptor,
    pub entity: Box<dyn Entity>,
}

impl TrackedEntity {
    pub fn added<T: Entity>(entity: T) -> Self {
        Self::tracked(EntityState::Added, entity)
    }

    pub fn modified<T: Entity>(entity: T) -> Self {
        Self::tracked(EntityState::Modified, entity)
    }

    pub fn deleted<T: Entity>(entity: T) -> Self {
        Self::tracked(EntityState::Deleted, entity)
    }

    fn tracked<T: Entity>(state: EntityState, entity: T) -> Self {
        Self {
            state,
            descriptor: T::descriptor(),
            entity: Box::new(entity),
        }
    }
}

/// Result of a successful [`TenantSession::save_changes`]
#[derive(Debug, Default)]
pub struct Committed {
    inserted: Vec<Box<dyn Entity>>,
    updated: Vec<Box<dyn Entity>>,
    deleted: u64,
}

impl Committed {
    /// Inserted rows of type `T`, as returned by the database
    pub fn inserted<T: Entity>(&mut self) -> Vec<T> {
        take_of::<T>(&mut self.inserted)
    }

    pub fn updated<T: Entity>(&mut self) -> Vec<T> {
        take_of::<T>(&mut self.updated)
    }

    pub fn deleted(&self) -> u64 {
        self.deleted
    }
}

fn take_of<T: Entity>(entities: &mut Vec<Box<dyn Entity>>) -> Vec<T> {
    let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(entities)
        .into_iter()
        .partition(|e| e.as_any().is::<T>());
    *entities = rest;
    matching
        .into_iter()
        .filter_map(|e| e.into_any().downcast::<T>().ok())
        .map(|b| *b)
        .collect()
}

/// Persistence session bound to one request's tenant.
///
/// Every command issued through the session passes the interceptor chain
/// with this session's [`TenantContext`]; there is no way to run a query
/// without one.
pub struct TenantSession {
    db: Database,
    tenant: TenantContext,
    pending: Vec<TrackedEntity>,
}

impl TenantSession {
    pub(crate) fn new(db: Database, tenant: TenantContext) -> Self {
        Self {
            db,
            tenant,
            pending: Vec::new(),
        }
    }

    pub fn tenant(&self) -> TenantContext {
        self.tenant
    }

    pub fn repository<T>(&self) -> Repository<'_, T>
    where
        T: Entity + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        Repository::new(self)
    }

    pub fn add<T: Entity>(&mut self, entity: T) {
        self.pending.push(TrackedEntity::added(entity));
    }

    pub fn update<T: Entity>(&mut self, entity: T) {
        self.pending.push(TrackedEntity::modified(entity));
    }

    pub fn remove<T: Entity>(&mut self, entity: T) {
        self.pending.push(TrackedEntity::deleted(entity));
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Tenant predicate for a descriptor, `None` for unscoped types.
    /// A scoped type without a registered filter is refused.
    pub fn scope_for(&self, descriptor: &EntityDescriptor) -> Result<Option<ScopePredicate>, DatabaseError> {
        if !descriptor.is_scoped() {
            return Ok(None);
        }
        let filter = self
            .db
            .registry()
            .filter_for(descriptor.type_id)
            .ok_or(DatabaseError::UnscopedEntity(descriptor.name))?;
        Ok(Some(filter.predicate(&self.tenant)))
    }

    /// Flush staged changes in one transaction.
    ///
    /// Save interceptors run once over the whole batch before any command
    /// is built. Staged entries are consumed even when the commit fails.
    pub async fn save_changes(&mut self) -> Result<Committed, DatabaseError> {
        let mut entries = std::mem::take(&mut self.pending);
        if entries.is_empty() {
            return Ok(Committed::default());
        }

        for entry in &entries {
            if self.db.model().find(entry.descriptor.type_id).is_none() {
                return Err(DatabaseError::QueryError(format!(
                    "Entity {} is not part of the schema model",
                    entry.descriptor.name
                )));
            }
            self.scope_for(&entry.descriptor)?;
        }

        self.db.interceptors().saving_changes(&mut entries, &self.tenant)?;

        let mut committed = Committed::default();
        let mut tx = self.db.pool().begin().await?;

        for mut entry in entries {
            match entry.state {
                EntityState::Added => {
                    let command = self.prepare(insert_command(&entry));
                    let started = Instant::now();
                    let row = build_query(&command).fetch_one(&mut *tx).await?;
                    self.db.log_command(&command, started.elapsed());
                    entry.entity.hydrate(&row)?;
                    committed.inserted.push(entry.entity);
                }
                EntityState::Modified => {
                    let scope = self.scope_for(&entry.descriptor)?;
                    let command = self.prepare(update_command(&entry, scope)?);
                    let started = Instant::now();
                    let row = build_query(&command).fetch_optional(&mut *tx).await?;
                    self.db.log_command(&command, started.elapsed());
                    let Some(row) = row else {
                        tracing::debug!("Update of {} {:?} matched no row", entry.descriptor.name, entry.entity.key());
                        return Err(DatabaseError::NotFound("Record not found".to_string()));
                    };
                    entry.entity.hydrate(&row)?;
                    committed.updated.push(entry.entity);
                }
                EntityState::Deleted => {
                    let scope = self.scope_for(&entry.descriptor)?;
                    let command = self.prepare(delete_command(&entry, scope));
                    let started = Instant::now();
                    let result = build_query(&command).execute(&mut *tx).await?;
                    self.db.log_command(&command, started.elapsed());
                    committed.deleted += result.rows_affected();
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(
            "Committed for tenant {:?}: {} inserted, {} updated, {} deleted",
            self.tenant.get(),
            committed.inserted.len(),
            committed.updated.len(),
            committed.deleted
        );
        Ok(committed)
    }

    pub async fn fetch_all<T>(&self, command: SqlCommand) -> Result<Vec<T>, DatabaseError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let command = self.prepare(command);
        let started = Instant::now();
        let rows = build_query_as::<T>(&command).fetch_all(self.db.pool()).await?;
        self.db.log_command(&command, started.elapsed());
        Ok(rows)
    }

    pub async fn fetch_optional<T>(&self, command: SqlCommand) -> Result<Option<T>, DatabaseError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let command = self.prepare(command);
        let started = Instant::now();
        let row = build_query_as::<T>(&command).fetch_optional(self.db.pool()).await?;
        self.db.log_command(&command, started.elapsed());
        Ok(row)
    }

    /// Untyped rows, for hand-written commands
    pub async fn fetch_rows(&self, command: SqlCommand) -> Result<Vec<PgRow>, DatabaseError> {
        let command = self.prepare(command);
        let started = Instant::now();
        let rows = build_query(&command).fetch_all(self.db.pool()).await?;
        self.db.log_command(&command, started.elapsed());
        Ok(rows)
    }

    /// Runs a command expected to return one row with a `count` column
    pub async fn count(&self, command: SqlCommand) -> Result<i64, DatabaseError> {
        let command = self.prepare(command);
        let started = Instant::now();
        let row = build_query(&command).fetch_one(self.db.pool()).await?;
        self.db.log_command(&command, started.elapsed());
        Ok(row.try_get("count")?)
    }

    /// Runs a command expected to return one row with an `exists` column
    pub async fn exists(&self, command: SqlCommand) -> Result<bool, DatabaseError> {
        let command = self.prepare(command);
        let started = Instant::now();
        let row = build_query(&command).fetch_one(self.db.pool()).await?;
        self.db.log_command(&command, started.elapsed());
        Ok(row.try_get("exists")?)
    }

    pub async fn execute(&self, command: SqlCommand) -> Result<u64, DatabaseError> {
        let command = self.prepare(command);
        let started = Instant::now();
        let result = build_query(&command).execute(self.db.pool()).await?;
        self.db.log_command(&command, started.elapsed());
        Ok(result.rows_affected())
    }

    /// Apply the command interceptors; every execution path goes through here
    pub fn prepare(&self, mut command: SqlCommand) -> SqlCommand {
        self.db.interceptors().command_executing(&mut command, &self.tenant);
        command
    }
}

fn build_query(command: &SqlCommand) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    command
        .params
        .iter()
        .fold(sqlx::query(&command.text), |q, p| bind_param_query(q, &p.value))
}

fn build_query_as<T>(command: &SqlCommand) -> sqlx::query::QueryAs<'_, Postgres, T, PgArguments>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    command
        .params
        .iter()
        .fold(sqlx::query_as::<_, T>(&command.text), |q, p| bind_param_query_as(q, &p.value))
}

/// `INSERT ... RETURNING *`, parameters named after their columns
pub(crate) fn insert_command(entry: &TrackedEntity) -> SqlCommand {
    let values = entry.entity.values();
    let columns = values
        .iter()
        .map(|(column, _)| format!("\"{}\"", column))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=values.len())
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let params = values
        .into_iter()
        .map(|(column, value)| CommandParam::named(column, value))
        .collect();

    SqlCommand::with_params(
        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING *",
            entry.descriptor.table, columns, placeholders
        ),
        params,
    )
}

/// `UPDATE ... RETURNING *` keyed on the primary key and the tenant scope.
/// The tenant column is never part of the SET list.
pub(crate) fn update_command(entry: &TrackedEntity, scope: Option<ScopePredicate>) -> Result<SqlCommand, DatabaseError> {
    let descriptor = &entry.descriptor;
    let mut command = SqlCommand::new(String::new());
    let mut assignments = Vec::new();

    for (column, value) in entry.entity.values() {
        if column == descriptor.key_column || Some(column) == descriptor.tenant_column {
            continue;
        }
        assignments.push(format!("\"{}\" = {}", column, command.next_placeholder()));
        command.params.push(CommandParam::named(column, value));
    }
    if assignments.is_empty() {
        return Err(DatabaseError::QueryError(format!(
            "Nothing to update on {}",
            descriptor.name
        )));
    }

    let conditions = key_conditions(&mut command, descriptor, entry.entity.key(), scope);
    command.text = format!(
        "UPDATE \"{}\" SET {} WHERE {} RETURNING *",
        descriptor.table,
        assignments.join(", "),
        conditions
    );
    Ok(command)
}

pub(crate) fn delete_command(entry: &TrackedEntity, scope: Option<ScopePredicate>) -> SqlCommand {
    let descriptor = &entry.descriptor;
    let mut command = SqlCommand::new(String::new());
    let conditions = key_conditions(&mut command, descriptor, entry.entity.key(), scope);
    command.text = format!("DELETE FROM \"{}\" WHERE {}", descriptor.table, conditions);
    command
}

fn key_conditions(
    command: &mut SqlCommand,
    descriptor: &EntityDescriptor,
    key: SqlValue,
    scope: Option<ScopePredicate>,
) -> String {
    let mut conditions = vec![format!("\"{}\" = {}", descriptor.key_column, command.next_placeholder())];
    command.params.push(CommandParam::positional(key));

    if let Some(scope) = scope {
        conditions.push(format!("\"{}\" = {}", scope.column, command.next_placeholder()));
        command.params.push(CommandParam::named(
            crate::database::command::TENANT_PARAM,
            SqlValue::tenant(&scope.tenant),
        ));
    }
    conditions.join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::command::TENANT_PARAM;
    use crate::database::models::Product;
    use crate::tenant::{TenantId, TenantContext};
    use rust_decimal::Decimal;

    fn product() -> Product {
        Product {
            id: 7,
            name: "Lamp".to_string(),
            price: Decimal::new(2500, 2),
            tenant_id: 4,
        }
    }

    fn scope(tenant: i32) -> Option<ScopePredicate> {
        Some(ScopePredicate {
            column: "tenant_id",
            tenant: TenantContext::for_tenant(tenant),
        })
    }

    #[test]
    fn insert_names_params_after_columns() {
        let cmd = insert_command(&TrackedEntity::added(product()));
        assert_eq!(
            cmd.text,
            "INSERT INTO \"products\" (\"name\", \"price\", \"tenant_id\") VALUES ($1, $2, $3) RETURNING *"
        );
        assert!(cmd.param(TENANT_PARAM).is_some());
        assert_eq!(cmd.param("name").map(|p| &p.value), Some(&SqlValue::Text("Lamp".into())));
    }

    #[test]
    fn update_never_sets_tenant_and_is_scoped() {
        let cmd = update_command(&TrackedEntity::modified(product()), scope(4)).unwrap();
        assert_eq!(
            cmd.text,
            "UPDATE \"products\" SET \"name\" = $1, \"price\" = $2 WHERE \"id\" = $3 AND \"tenant_id\" = $4 RETURNING *"
        );
        assert_eq!(cmd.params.len(), 4);
        assert_eq!(cmd.params[2].value, SqlValue::Int(7));
        assert_eq!(
            cmd.param(TENANT_PARAM).map(|p| &p.value),
            Some(&SqlValue::Tenant(Some(TenantId(4))))
        );
    }

    #[test]
    fn delete_is_scoped() {
        let cmd = delete_command(&TrackedEntity::deleted(product()), scope(2));
        assert_eq!(cmd.text, "DELETE FROM \"products\" WHERE \"id\" = $1 AND \"tenant_id\" = $2");
    }

    #[test]
    fn committed_downcasts_by_type() {
        let mut committed = Committed {
            inserted: vec![Box::new(product())],
            ..Default::default()
        };
        assert!(committed.updated::<Product>().is_empty());
        let inserted = committed.inserted::<Product>();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].name, "Lamp");
        assert!(committed.inserted::<Product>().is_empty());
    }

    #[tokio::test]
    async fn scoped_type_missing_from_registry_is_refused() {
        let db = crate::testing::lazy_database_with(crate::database::SchemaModel::builder().build().unwrap());
        let session = db.session(TenantContext::for_tenant(1));
        let err = session.scope_for(&<Product as Entity>::descriptor()).unwrap_err();
        assert!(matches!(err, DatabaseError::UnscopedEntity(_)));
    }

    #[tokio::test]
    async fn prepare_runs_command_interceptors() {
        let db = crate::testing::lazy_database();
        let session = db.session(TenantContext::for_tenant(9));
        let cmd = session.prepare(SqlCommand::new("SELECT * FROM products"));
        assert_eq!(cmd.text, "SELECT * FROM products WHERE \"tenant_id\" = $1");
        assert_eq!(cmd.params[0].value, SqlValue::Tenant(Some(TenantId(9))));
    }
}

use sqlx::{postgres::PgRow, FromRow};

use crate::database::entity::Entity;
use crate::database::manager::DatabaseError;
use crate::database::session::TenantSession;
use crate::filter::{Filter, FilterData};

/// Structured query over one entity type. The tenant scope registered for
/// `T` is attached at construction and cannot be removed by later filters.
pub struct QueryBuilder<'s, T> {
    session: &'s TenantSession,
    filter: Filter,
    _phantom: std::marker::PhantomData<T>,
}

impl<'s, T> QueryBuilder<'s, T>
where
    T: Entity + for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    pub fn new(session: &'s TenantSession) -> Result<Self, DatabaseError> {
        let descriptor = T::descriptor();
        let mut filter = Filter::new(descriptor.table).map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        if let Some(predicate) = session.scope_for(&descriptor)? {
            tracing::debug!("Scoping {} to tenant {:?}", descriptor.name, predicate.tenant.get());
            filter.scope(predicate);
        }
        Ok(Self {
            session,
            filter,
            _phantom: std::marker::PhantomData,
        })
    }

    pub fn filter(mut self, filter_data: FilterData) -> Result<Self, DatabaseError> {
        self.filter
            .assign(filter_data)
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        Ok(self)
    }

    pub async fn select_all(self) -> Result<Vec<T>, DatabaseError> {
        let command = self.filter.to_sql().map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        self.session.fetch_all(command).await
    }

    pub async fn select_optional(self) -> Result<Option<T>, DatabaseError> {
        let command = self.filter.to_sql().map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        self.session.fetch_optional(command).await
    }

    pub async fn count(self) -> Result<i64, DatabaseError> {
        let command = self
            .filter
            .to_count_sql()
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        self.session.count(command).await
    }

    pub async fn exists(self) -> Result<bool, DatabaseError> {
        let command = self
            .filter
            .to_exists_sql()
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        self.session.exists(command).await
    }

    /// Generated command before interception, for inspection
    pub fn to_command(&self) -> Result<crate::database::command::SqlCommand, DatabaseError> {
        self.filter.to_sql().map_err(|e| DatabaseError::QueryError(e.to_string()))
    }
}

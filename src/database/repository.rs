use serde_json::{json, Map, Value};
use sqlx::{postgres::PgRow, FromRow};

use crate::database::entity::Entity;
use crate::database::manager::DatabaseError;
use crate::database::query_builder::QueryBuilder;
use crate::database::session::TenantSession;
use crate::filter::FilterData;

/// Typed read access to one entity type within a tenant session
pub struct Repository<'s, T> {
    session: &'s TenantSession,
    _phantom: std::marker::PhantomData<T>,
}

impl<'s, T> Repository<'s, T>
where
    T: Entity + for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    pub fn new(session: &'s TenantSession) -> Self {
        Self {
            session,
            _phantom: std::marker::PhantomData,
        }
    }

    pub async fn select_any(&self, filter_data: FilterData) -> Result<Vec<T>, DatabaseError> {
        QueryBuilder::<T>::new(self.session)?
            .filter(filter_data)?
            .select_all()
            .await
    }

    pub async fn select_one(&self, filter_data: FilterData) -> Result<Option<T>, DatabaseError> {
        QueryBuilder::<T>::new(self.session)?
            .filter(filter_data)?
            .select_optional()
            .await
    }

    pub async fn select_404(&self, filter_data: FilterData) -> Result<T, DatabaseError> {
        self.select_one(filter_data)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("Record not found".to_string()))
    }

    /// Row by primary key, `None` when it does not exist for this tenant
    pub async fn find(&self, id: i64) -> Result<Option<T>, DatabaseError> {
        self.select_one(Self::by_key(id)).await
    }

    pub async fn count(&self, filter_data: FilterData) -> Result<i64, DatabaseError> {
        QueryBuilder::<T>::new(self.session)?
            .filter(filter_data)?
            .count()
            .await
    }

    pub async fn exists(&self, id: i64) -> Result<bool, DatabaseError> {
        QueryBuilder::<T>::new(self.session)?
            .filter(Self::by_key(id))?
            .exists()
            .await
    }

    fn by_key(id: i64) -> FilterData {
        let mut key = Map::new();
        key.insert(T::descriptor().key_column.to_string(), json!(id));
        FilterData::with_where(Value::Object(key))
    }
}

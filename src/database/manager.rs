use std::sync::Arc;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;

use crate::config::config;
use crate::database::command::SqlCommand;
use crate::database::models::Product;
use crate::database::schema::{SchemaError, SchemaModel};
use crate::database::session::TenantSession;
use crate::interceptor::{InterceptError, InterceptorChain, TenantCommandInterceptor, TenantWriteInterceptor};
use crate::tenant::{AutoScopeRegistrar, ScopeRegistry, TenantContext};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Entity {0} is tenant-scoped but has no registered tenant filter")]
    UnscopedEntity(&'static str),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Intercept(#[from] InterceptError),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy)]
struct QueryLogging {
    enabled: bool,
    slow_threshold: Option<Duration>,
}

/// Connection pool plus the immutable scoping state shared by all sessions
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    model: Arc<SchemaModel>,
    registry: Arc<ScopeRegistry>,
    interceptors: InterceptorChain,
    logging: QueryLogging,
}

impl Database {
    /// Entity model served by this application
    pub fn schema() -> Result<SchemaModel, SchemaError> {
        SchemaModel::builder().collection::<Product>().build()
    }

    /// Connect using `DATABASE_URL` and the pool settings from config
    pub async fn connect() -> Result<Self, DatabaseError> {
        let url = database_url()?;
        let cfg = &config().database;
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(cfg.connection_timeout))
            .connect(&url)
            .await?;
        info!("Connected to database at {}", redacted(&url));
        Self::from_pool(pool, Self::schema()?)
    }

    /// Pool that only connects on first use
    pub fn connect_lazy(url: &str, model: SchemaModel) -> Result<Self, DatabaseError> {
        url::Url::parse(url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        let pool = PgPoolOptions::new()
            .max_connections(config().database.max_connections)
            .connect_lazy(url)?;
        Self::from_pool(pool, model)
    }

    /// Register tenant filters for the model and assemble the interceptor chain
    pub fn from_pool(pool: PgPool, model: SchemaModel) -> Result<Self, DatabaseError> {
        let registry = Arc::new(AutoScopeRegistrar::register(&model)?);
        let tenancy = &config().tenancy;

        let mut interceptors = InterceptorChain::new().with_save(TenantWriteInterceptor);
        if tenancy.enable_command_interceptor {
            interceptors = interceptors
                .with_command(TenantCommandInterceptor::new(registry.clone()).with_logging(tenancy.log_rewrites));
        } else {
            tracing::warn!("Command text interceptor disabled; only structured queries are tenant-scoped");
        }
        info!("Interceptors: {:?}", interceptors.names());

        let cfg = &config().database;
        Ok(Self {
            pool,
            model: Arc::new(model),
            registry,
            interceptors,
            logging: QueryLogging {
                enabled: cfg.enable_query_logging,
                slow_threshold: cfg
                    .enable_slow_query_warning
                    .then(|| Duration::from_millis(cfg.slow_query_threshold_ms)),
            },
        })
    }

    /// Open a persistence session for one request
    pub fn session(&self, tenant: TenantContext) -> TenantSession {
        TenantSession::new(self.clone(), tenant)
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!().run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn model(&self) -> &SchemaModel {
        &self.model
    }

    pub fn registry(&self) -> &ScopeRegistry {
        &self.registry
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    pub(crate) fn log_command(&self, command: &SqlCommand, elapsed: Duration) {
        if self.logging.enabled {
            tracing::debug!("SQL ({} params, {:?}): {}", command.params.len(), elapsed, command.text);
        }
        if let Some(threshold) = self.logging.slow_threshold {
            if elapsed > threshold {
                tracing::warn!("Slow query ({}ms): {}", elapsed.as_millis(), command.text);
            }
        }
    }
}

pub fn database_url() -> Result<String, DatabaseError> {
    let url = std::env::var("DATABASE_URL").map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;
    url::Url::parse(&url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
    Ok(url)
}

/// Connection string with the password masked, for logs
pub fn redacted(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.into()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

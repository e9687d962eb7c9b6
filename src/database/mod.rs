use sqlx::PgPool;

mod documents;
mod runs;
mod schema;

/// Database connection pool wrapper
///
/// Implements the Postgres-backed [`RunStore`](crate::store::RunStore) and the
/// similarity-search and document-retrieval capabilities.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
    embedding_dimension: usize,
}

impl Database {
    #[must_use]
    pub const fn new(pool: PgPool, embedding_dimension: usize) -> Self {
        Self {
            pool,
            embedding_dimension,
        }
    }

    /// Create a new database instance from configuration
    pub async fn from_config(config: &crate::config::AppConfig) -> crate::Result<Self> {
        let pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections())
            .min_connections(config.min_connections())
            .acquire_timeout(std::time::Duration::from_secs(config.connection_timeout()));

        let pool = pool_options.connect(config.database_url()).await?;

        tracing::info!(
            "Database pool configured: max_connections={}, min_connections={}",
            config.max_connections(),
            config.min_connections()
        );

        Ok(Self::new(pool, config.embedding_dimension()))
    }

    /// Get a reference to the database pool for raw queries
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub const fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }
}

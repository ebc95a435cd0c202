use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use partwatch_common::error::Result;

/// Holds the shared Postgres connection pool. The store is the single
/// source of truth for queues, state, and heartbeats — there is no
/// in-process queue layered in front of it.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("src/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| partwatch_common::error::PipelineError::Database(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

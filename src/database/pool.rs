use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::config::settings::DatabaseConfig;
use crate::error::{OrchestratorError, Result};

/// Thin wrapper around a process-wide Postgres pool, sized per spec §5
/// ("≈ 2× expected concurrent turns").
#[derive(Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| OrchestratorError::ConfigInvalid(format!("database connect: {e}")))?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

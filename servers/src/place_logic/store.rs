use crate::place_logic::model::Pixel;
use deadpool_postgres::{Config as DeadpoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use thiserror::Error;
use tokio_postgres::NoTls;

/// Failures of the persistence gateway. Everything maps to `Unavailable`:
/// callers degrade (empty snapshot, dropped placement) rather than retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Gateway to the canonical pixel table. The store owns the only durable
/// copy of the canvas; everything clients hold is a transient cached view.
#[derive(Clone)]
pub struct PixelStore {
    pool: Pool,
}

impl PixelStore {
    /// Builds the connection pool and prepares the `pixels` table. The schema
    /// round-trip doubles as the startup health check: if the database cannot
    /// be reached here, the caller treats it as fatal.
    pub async fn connect(db_url: &str, pool_size: usize) -> Result<Self, StoreError> {
        let store = Self::build(db_url, pool_size)?;

        let client = store.client().await?;
        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS pixels (
                    x INT NOT NULL,
                    y INT NOT NULL,
                    color TEXT NOT NULL,
                    PRIMARY KEY (x, y)
                )",
            )
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(store)
    }

    fn build(db_url: &str, pool_size: usize) -> Result<Self, StoreError> {
        let mut pg_pool_config = DeadpoolConfig::new();
        pg_pool_config.url = Some(db_url.to_string());
        pg_pool_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast, // Recommended for tokio-postgres
        });
        pg_pool_config.pool = Some(deadpool_postgres::PoolConfig::new(pool_size));

        let pool = pg_pool_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Unavailable(format!("failed to create pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Every stored pixel, in unspecified order. The full set is the canvas;
    /// order carries no meaning.
    pub async fn load_all(&self) -> Result<Vec<Pixel>, StoreError> {
        let client = self.client().await?;
        let rows = client
            .query("SELECT x, y, color FROM pixels", &[])
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| Pixel {
                x: row.get(0),
                y: row.get(1),
                color: row.get(2),
            })
            .collect())
    }

    /// Insert-or-update keyed by `(x, y)`. The single-statement upsert gives
    /// per-coordinate atomicity; concurrent writers to the same cell resolve
    /// to whichever upsert completes last.
    pub async fn upsert(&self, x: i32, y: i32, color: &str) -> Result<(), StoreError> {
        let client = self.client().await?;
        client
            .execute(
                "INSERT INTO pixels (x, y, color) VALUES ($1, $2, $3)
                 ON CONFLICT (x, y) DO UPDATE SET color = EXCLUDED.color",
                &[&x, &y, &color],
            )
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn client(&self) -> Result<deadpool_postgres::Client, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Pool without the startup round-trip, for exercising the degraded
    /// paths against an unreachable database.
    #[cfg(test)]
    pub(crate) fn connect_lazy(db_url: &str) -> Result<Self, StoreError> {
        Self::build(db_url, 1)
    }
}

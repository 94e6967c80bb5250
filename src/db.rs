use sqlx::{postgres::PgPoolOptions, PgPool};

/// Schema DDL, idempotent (`CREATE ... IF NOT EXISTS`).
const SCHEMA: &str = include_str!("../migrations/0001_initial_schema.sql");

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Creates the tables when missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("Database schema verified");
        Ok(())
    }
}

use async_trait::async_trait;
use chrono::NaiveDateTime;
use core_types::config::DbConfig;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::info;
use tokio_postgres::{error::SqlState, NoTls};

use crate::error::{Result, StoreError};
use crate::topics::TopicMeta;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS topics (
    topic_id SERIAL PRIMARY KEY,
    topic_name TEXT UNIQUE NOT NULL,
    index_name TEXT,
    type TEXT,
    strike INTEGER
);

CREATE TABLE IF NOT EXISTS ltp_data (
    id SERIAL PRIMARY KEY,
    topic_id INTEGER REFERENCES topics(topic_id),
    ltp DOUBLE PRECISION NOT NULL,
    received_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
";

/// Outcome of a topic insert attempt. A conflict means a concurrent
/// resolution committed the same name first; the caller re-reads and
/// uses the winner's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i32),
    Conflict,
}

/// Seam over the durable store, one method per statement the pipeline
/// issues. Kept narrow so tests can swap in an in-memory double.
#[async_trait]
pub trait TickStore: Send + Sync {
    async fn fetch_topic_id(&self, name: &str) -> Result<Option<i32>>;
    async fn insert_topic(&self, meta: &TopicMeta) -> Result<InsertOutcome>;
    async fn insert_reading(&self, topic_id: i32, ltp: f64, received_at: NaiveDateTime)
        -> Result<()>;
    async fn load_topics(&self) -> Result<Vec<(String, i32)>>;
}

/// Postgres-backed store behind a deadpool connection pool.
pub struct PgTickStore {
    pool: Pool,
}

impl PgTickStore {
    pub fn connect(cfg: &DbConfig) -> Result<Self> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&cfg.host)
            .port(cfg.port)
            .user(&cfg.user)
            .password(&cfg.password)
            .dbname(&cfg.dbname)
            .connect_timeout(cfg.connect_timeout)
            .keepalives_idle(cfg.keepalive_idle);
        let mgr = Manager::from_config(
            pg,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(mgr)
            .max_size(cfg.pool_size)
            .build()
            .map_err(|err| StoreError::PoolBuild(err.to_string()))?;
        Ok(Self { pool })
    }

    /// Create the `topics` and `ltp_data` tables if absent. A failure
    /// here aborts startup.
    pub async fn init_schema(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.batch_execute(SCHEMA).await?;
        info!("database schema ensured");
        Ok(())
    }
}

#[async_trait]
impl TickStore for PgTickStore {
    async fn fetch_topic_id(&self, name: &str) -> Result<Option<i32>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT topic_id FROM topics WHERE topic_name = $1", &[&name])
            .await?;
        Ok(row.map(|row| row.get(0)))
    }

    async fn insert_topic(&self, meta: &TopicMeta) -> Result<InsertOutcome> {
        let client = self.pool.get().await?;
        let inserted = client
            .query_one(
                "INSERT INTO topics (topic_name, index_name, type, strike) \
                 VALUES ($1, $2, $3, $4) RETURNING topic_id",
                &[&meta.name, &meta.index_name, &meta.option_type, &meta.strike],
            )
            .await;
        match inserted {
            Ok(row) => Ok(InsertOutcome::Inserted(row.get(0))),
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Ok(InsertOutcome::Conflict)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn insert_reading(
        &self,
        topic_id: i32,
        ltp: f64,
        received_at: NaiveDateTime,
    ) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO ltp_data (topic_id, ltp, received_at) VALUES ($1, $2, $3)",
                &[&topic_id, &ltp, &received_at],
            )
            .await?;
        Ok(())
    }

    async fn load_topics(&self) -> Result<Vec<(String, i32)>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT topic_name, topic_id FROM topics", &[])
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get(0), row.get(1)))
            .collect())
    }
}

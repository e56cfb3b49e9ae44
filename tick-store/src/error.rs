use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    #[error("failed to build connection pool: {0}")]
    PoolBuild(String),
    #[error("store backend error: {0}")]
    Backend(#[from] std::io::Error),
    #[error("topic '{name}' missing after insert conflict")]
    TopicRace { name: String },
    #[error("store unavailable after {attempts} attempts: {source}")]
    Unavailable {
        attempts: usize,
        #[source]
        source: Box<StoreError>,
    },
}

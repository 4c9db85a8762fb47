use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::models::{ConsolidatedRecord, PersistedAck, PersistedBook};

/// Write in flight; the store's acknowledgement arrives when it resolves
pub type PendingWrite = Pin<Box<dyn Future<Output = Result<PersistedAck, PersistenceError>> + Send>>;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("document store rejected the write: {0}")]
    Rejected(String),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(_) | sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Rejected(err.to_string())
            }
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Document store keyed by file name. A second write for the same file replaces the
/// first.
pub trait DocumentStore: Send + Sync {
    fn write(&self, record: ConsolidatedRecord) -> PendingWrite;
}

/// Hands consolidated records to the document store
#[derive(Clone)]
pub struct PersistenceSink {
    store: Arc<dyn DocumentStore>,
}

impl PersistenceSink {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Issue the write. Nothing is acknowledged until the returned future resolves.
    pub fn persist(&self, record: ConsolidatedRecord) -> PendingWrite {
        let file_name = record.file_name.clone();
        let pending = self.store.write(record);

        Box::pin(async move {
            match pending.await {
                Ok(ack) => {
                    info!(file_name = %file_name, write_timestamp = %ack.write_timestamp, "Book record persisted");
                    Ok(ack)
                }
                Err(e) => {
                    error!(file_name = %file_name, error = %e, "Failed to persist book record");
                    Err(e)
                }
            }
        })
    }
}

/// Process-local store used when no database is configured
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<DashMap<String, PersistedBook>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file_name: &str) -> Option<PersistedBook> {
        self.documents.get(file_name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn write(&self, record: ConsolidatedRecord) -> PendingWrite {
        let documents = self.documents.clone();
        Box::pin(async move {
            let ack = PersistedAck {
                write_timestamp: Utc::now(),
            };
            let file_name = record.file_name.clone();
            documents.insert(file_name, PersistedBook::from_record(record, ack));
            Ok(ack)
        })
    }
}

const CREATE_BOOK_IMAGES: &str = "CREATE TABLE IF NOT EXISTS book_images (
    file_name TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    summary TEXT NOT NULL,
    availability_note TEXT NOT NULL,
    write_timestamp TIMESTAMPTZ NOT NULL
)";

const UPSERT_BOOK_IMAGE: &str = "INSERT INTO book_images
    (file_name, title, author, summary, availability_note, write_timestamp)
VALUES ($1, $2, $3, $4, $5, now())
ON CONFLICT (file_name) DO UPDATE SET
    title = EXCLUDED.title,
    author = EXCLUDED.author,
    summary = EXCLUDED.summary,
    availability_note = EXCLUDED.availability_note,
    write_timestamp = EXCLUDED.write_timestamp
RETURNING write_timestamp";

/// `book_images` table in Postgres
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Wrap the pool and make sure the table exists
    pub async fn new(pool: PgPool) -> anyhow::Result<Self> {
        sqlx::query(CREATE_BOOK_IMAGES).execute(&pool).await?;
        info!("book_images table ready");
        Ok(Self { pool })
    }
}

impl DocumentStore for PostgresDocumentStore {
    fn write(&self, record: ConsolidatedRecord) -> PendingWrite {
        let pool = self.pool.clone();
        Box::pin(async move {
            let write_timestamp = sqlx::query_scalar::<_, DateTime<Utc>>(UPSERT_BOOK_IMAGE)
                .bind(&record.file_name)
                .bind(&record.title)
                .bind(&record.author)
                .bind(&record.summary)
                .bind(&record.availability_note)
                .fetch_one(&pool)
                .await?;
            Ok(PersistedAck { write_timestamp })
        })
    }
}

pub async fn connect_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file_name: &str, note: &str) -> ConsolidatedRecord {
        ConsolidatedRecord {
            file_name: file_name.to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            summary: String::new(),
            availability_note: note.to_string(),
        }
    }

    struct UnreachableStore;

    impl DocumentStore for UnreachableStore {
        fn write(&self, _record: ConsolidatedRecord) -> PendingWrite {
            Box::pin(async { Err(PersistenceError::Unavailable("connection refused".to_string())) })
        }
    }

    #[tokio::test]
    async fn writes_are_keyed_by_file_name() {
        let store = InMemoryDocumentStore::new();
        let sink = PersistenceSink::new(Arc::new(store.clone()));

        sink.persist(record("book1.jpg", "first")).await.unwrap();
        let ack = sink.persist(record("book1.jpg", "second")).await.unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.get("book1.jpg").unwrap();
        assert_eq!(stored.availability_note, "second");
        assert_eq!(stored.write_timestamp, ack.write_timestamp);
    }

    #[tokio::test]
    async fn nothing_is_written_until_the_future_is_awaited() {
        let store = InMemoryDocumentStore::new();
        let sink = PersistenceSink::new(Arc::new(store.clone()));

        let pending = sink.persist(record("book2.jpg", "note"));
        assert!(store.is_empty());

        pending.await.unwrap();
        assert!(store.get("book2.jpg").is_some());
    }

    #[tokio::test]
    async fn store_failures_surface_as_errors() {
        let sink = PersistenceSink::new(Arc::new(UnreachableStore));
        let err = sink.persist(record("book1.jpg", "note")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Unavailable(_)));
    }

    #[test]
    fn sqlx_pool_errors_mean_unavailable() {
        let err: PersistenceError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, PersistenceError::Unavailable(_)));
    }
}

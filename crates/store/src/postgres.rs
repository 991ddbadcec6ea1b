//! Postgres document store.
//!
//! One table, one JSONB column for the document body, one bigint version
//! column for compare-and-swap. The conditional write is a single
//! `UPDATE ... WHERE id = $1 AND version = $2`, so the database enforces
//! CAS atomically without any advisory locks.

use reelflow_core::document::WorkflowDocument;
use reelflow_core::types::DocId;
use sqlx::PgPool;

use crate::store::{DocumentStore, StoreError, Version, Versioned, WriteOutcome};

/// Schema for the single documents table.
const SCHEMA: &str = "\
    CREATE TABLE IF NOT EXISTS workflow_documents ( \
        id UUID PRIMARY KEY, \
        doc JSONB NOT NULL, \
        version BIGINT NOT NULL, \
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW() \
    )";

/// Postgres-backed [`DocumentStore`].
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a connection pool from a database URL.
    pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
    }

    /// Ensure the documents table exists.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    fn encode(doc: &WorkflowDocument) -> Result<serde_json::Value, StoreError> {
        serde_json::to_value(doc).map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn decode(id: DocId, value: serde_json::Value) -> Result<WorkflowDocument, StoreError> {
        serde_json::from_value(value)
            .map_err(|e| StoreError::Backend(format!("Corrupt document {id}: {e}")))
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait::async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, doc: &WorkflowDocument) -> Result<Version, StoreError> {
        let body = Self::encode(doc)?;
        let result = sqlx::query(
            "INSERT INTO workflow_documents (id, doc, version) \
             VALUES ($1, $2, 1) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(doc.id)
        .bind(&body)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(doc.id));
        }
        Ok(Version(1))
    }

    async fn read(&self, id: DocId) -> Result<Versioned<WorkflowDocument>, StoreError> {
        let row: Option<(serde_json::Value, i64)> =
            sqlx::query_as("SELECT doc, version FROM workflow_documents WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        let (body, version) = row.ok_or(StoreError::NotFound(id))?;
        Ok(Versioned {
            value: Self::decode(id, body)?,
            version: Version(version),
        })
    }

    async fn write_if_version(
        &self,
        id: DocId,
        expected: Version,
        doc: &WorkflowDocument,
    ) -> Result<WriteOutcome, StoreError> {
        let body = Self::encode(doc)?;
        let new_version: Option<(i64,)> = sqlx::query_as(
            "UPDATE workflow_documents \
             SET doc = $3, version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING version",
        )
        .bind(id)
        .bind(expected.0)
        .bind(&body)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match new_version {
            Some((v,)) => Ok(WriteOutcome::Written(Version(v))),
            None => {
                // Distinguish a lost race from a missing document.
                let exists: Option<(i64,)> =
                    sqlx::query_as("SELECT version FROM workflow_documents WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(backend)?;
                match exists {
                    Some(_) => Ok(WriteOutcome::Conflict),
                    None => Err(StoreError::NotFound(id)),
                }
            }
        }
    }
}

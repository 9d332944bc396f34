//! pgvector (PostgreSQL) vector store backend.
//!
//! Provides [`PgVectorStore`] which implements [`VectorStore`] using
//! [sqlx](https://docs.rs/sqlx) with the
//! [pgvector](https://github.com/pgvector/pgvector) PostgreSQL extension.
//!
//! All documents live in one table (default `documents`):
//!
//! ```sql
//! CREATE TABLE documents (
//!     id TEXT PRIMARY KEY,
//!     content TEXT NOT NULL,
//!     embedding vector(<dimensions>),
//!     metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! plus an `ivfflat` cosine index on `embedding` and a GIN index on
//! `metadata`. The schema is created on first use. Building the `ivfflat`
//! index can fail on small or very wide tables; that failure is logged and
//! ignored, and searches then run as exact scans.
//!
//! Each search runs in its own transaction with `ivfflat.probes` raised to
//! the number of lists, so a selective metadata filter cannot starve the
//! index scan of candidates and `top_k` is filled whenever enough rows match.
//! `ivfflat` trains its lists on the rows present when the index is built;
//! after a bulk load into a fresh table, rebuild it with
//! `REINDEX INDEX <table>_embedding_idx`.
//!
//! Scores are `1 - cosine distance`. A zero-magnitude vector has no defined
//! distance; its score is reported as `0` and it sorts after every other row.
//!
//! # Example
//!
//! ```rust,ignore
//! use novel_rag::pgvector::{PgVectorConfig, PgVectorStore};
//!
//! let store = PgVectorStore::connect(PgVectorConfig::from_env()?, embedder).await?;
//! store.add_document("vol1-chunk0", "text", metadata).await?;
//! let results = store.search("query", 5, None).await?;
//! store.close().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::document::{Metadata, NewDocument, SearchResult, VectorDocument};
use crate::embedding::{EmbeddingProvider, is_zero_norm};
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::vectorstore::{VectorStore, validate_document, validate_search};

const BACKEND: &str = "pgvector";

/// Number of `ivfflat` lists; searches scan all of them.
const IVFFLAT_LISTS: u32 = 100;

/// Connection settings for [`PgVectorStore`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PgVectorConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Table holding the documents.
    pub table: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// How long to wait for a pooled connection, in seconds.
    pub acquire_timeout_secs: u64,
}

impl PgVectorConfig {
    /// Create a configuration for `database_url` with default pool settings.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            table: "documents".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }

    /// Read `DATABASE_URL` (required), `PGVECTOR_TABLE` and
    /// `PGVECTOR_MAX_CONNECTIONS` (optional) from the environment.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("DATABASE_URL").map_err(|_| {
            RagError::ConfigError("DATABASE_URL environment variable not set".into())
        })?;
        let mut config = Self::new(url);
        if let Ok(table) = std::env::var("PGVECTOR_TABLE") {
            config.table = table;
        }
        if let Ok(raw) = std::env::var("PGVECTOR_MAX_CONNECTIONS") {
            config.max_connections = raw.trim().parse().map_err(|_| {
                RagError::ConfigError(format!(
                    "PGVECTOR_MAX_CONNECTIONS has an invalid value: '{raw}'"
                ))
            })?;
        }
        Ok(config)
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// A [`VectorStore`] backed by PostgreSQL with the pgvector extension.
///
/// Similarity ranking, metadata filtering and the `top_k` limit all run in
/// the database; only the final rows are transferred.
pub struct PgVectorStore {
    pool: PgPool,
    embedder: Arc<dyn EmbeddingProvider>,
    table: String,
    initialized: OnceCell<()>,
}

impl PgVectorStore {
    /// Connect to the database described by `config`.
    ///
    /// The schema is not touched until the first operation or an explicit
    /// [`initialize`](PgVectorStore::initialize).
    pub async fn connect(
        config: PgVectorConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let table = Self::sanitize_table_name(&config.table)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(Self::map_err)?;
        info!(table = %table, max_connections = config.max_connections, "connected to pgvector");
        Ok(Self { pool, embedder, table, initialized: OnceCell::new() })
    }

    /// Create a store from an existing connection pool.
    pub fn from_pool(
        pool: PgPool,
        embedder: Arc<dyn EmbeddingProvider>,
        table: &str,
    ) -> Result<Self> {
        let table = Self::sanitize_table_name(table)?;
        Ok(Self { pool, embedder, table, initialized: OnceCell::new() })
    }

    /// The sanitized table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the extension, table and indexes if they are missing.
    ///
    /// Runs at most once per store; later calls return immediately.
    pub async fn initialize(&self) -> Result<()> {
        self.initialized.get_or_try_init(|| self.create_schema()).await?;
        Ok(())
    }

    /// Close every pooled connection. The store is unusable afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!(table = %self.table, "closed pgvector pool");
    }

    async fn create_schema(&self) -> Result<()> {
        let table = &self.table;
        let dimensions = self.embedder.dimensions();

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;

        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                id TEXT PRIMARY KEY, \
                content TEXT NOT NULL, \
                embedding vector({dimensions}), \
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\
            )"
        );
        sqlx::query(&create_sql).execute(&self.pool).await.map_err(Self::map_err)?;

        let embedding_index = format!(
            "CREATE INDEX IF NOT EXISTS {table}_embedding_idx ON {table} \
             USING ivfflat (embedding vector_cosine_ops) WITH (lists = {IVFFLAT_LISTS})"
        );
        match sqlx::query(&embedding_index).execute(&self.pool).await {
            Ok(_) => {}
            Err(e) if is_soft_index_failure(&e) => {
                warn!(
                    table = %table,
                    error = %e,
                    "skipping ivfflat index; searches fall back to exact scan"
                );
            }
            Err(e) => return Err(Self::map_err(e)),
        }

        let metadata_index = format!(
            "CREATE INDEX IF NOT EXISTS {table}_metadata_idx ON {table} USING gin (metadata)"
        );
        sqlx::query(&metadata_index).execute(&self.pool).await.map_err(Self::map_err)?;

        info!(table = %table, dimensions, "initialized pgvector schema");
        Ok(())
    }

    fn map_err(e: sqlx::Error) -> RagError {
        match e {
            sqlx::Error::PoolTimedOut => {
                RagError::Timeout { operation: "acquiring a pgvector connection".to_string() }
            }
            e => {
                RagError::VectorStoreError { backend: BACKEND.to_string(), message: e.to_string() }
            }
        }
    }

    /// Sanitize a table name for interpolation into SQL.
    /// Only allows alphanumeric characters and underscores.
    fn sanitize_table_name(name: &str) -> Result<String> {
        let sanitized: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        match sanitized.chars().next() {
            None => Err(RagError::ConfigError("table name is empty after sanitization".into())),
            Some(c) if c.is_ascii_digit() => Err(RagError::ConfigError(format!(
                "table name '{sanitized}' must not start with a digit"
            ))),
            Some(_) => Ok(sanitized),
        }
    }

    async fn upsert(
        &self,
        id: &str,
        content: &str,
        embedding: &[f32],
        metadata: &Metadata,
    ) -> Result<()> {
        let upsert_sql = format!(
            "INSERT INTO {} (id, content, embedding, metadata) \
             VALUES ($1, $2, $3::vector, $4) \
             ON CONFLICT (id) DO UPDATE SET \
                content = EXCLUDED.content, \
                embedding = EXCLUDED.embedding, \
                metadata = EXCLUDED.metadata",
            self.table
        );

        sqlx::query(&upsert_sql)
            .bind(id)
            .bind(content)
            .bind(to_vector_literal(embedding))
            .bind(Json(metadata))
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        let expected = self.embedder.dimensions();
        if embedding.len() != expected {
            return Err(RagError::DimensionMismatch { expected, actual: embedding.len() });
        }
        Ok(())
    }
}

/// Classify index-build failures that leave the store fully functional.
///
/// `ivfflat` refuses to build when the table is too wide for the index
/// (`program_limit_exceeded`) or the build needs more `maintenance_work_mem`
/// than is available (`out_of_memory`), and warns or errors on tables with too
/// few rows to train its lists.
fn is_soft_index_failure(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => soft_index_failure(db.code().as_deref(), db.message()),
        _ => false,
    }
}

fn soft_index_failure(code: Option<&str>, message: &str) -> bool {
    matches!(code, Some("54000") | Some("53200"))
        || message.contains("little data")
        || message.contains("maintenance_work_mem")
}

/// Render an embedding in pgvector's text input format, e.g. `[1,2.5,3]`.
fn to_vector_literal(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

/// Parse pgvector's text output format back into an embedding.
fn parse_vector_literal(text: &str) -> Result<Vec<f32>> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|v| {
            v.trim().parse::<f32>().map_err(|e| RagError::VectorStoreError {
                backend: BACKEND.to_string(),
                message: format!("invalid vector component '{v}': {e}"),
            })
        })
        .collect()
}

/// Transaction-scoped setting that makes an `ivfflat` scan visit every list.
fn probes_statement() -> String {
    format!("SET LOCAL ivfflat.probes = {IVFFLAT_LISTS}")
}

/// Build the ranked, filtered and limited similarity query.
///
/// `NaN` distances from zero-magnitude vectors score `0`; they sort last
/// under PostgreSQL's `NaN` ordering.
fn build_search_query(
    table: &str,
    vector: String,
    filter: Option<&MetadataFilter>,
    top_k: usize,
) -> QueryBuilder<'static, Postgres> {
    // pgvector cosine distance operator: <=>
    // Returns distance (0 = identical), so score = 1 - distance
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT id, content, metadata, COALESCE(NULLIF(1 - (embedding <=> ",
    );
    qb.push_bind(vector.clone())
        .push("::vector), 'NaN'::float8), 0) AS score FROM ")
        .push(table);
    if let Some(filter) = filter {
        qb.push(" WHERE ");
        push_filter(&mut qb, filter);
    }
    qb.push(" ORDER BY embedding <=> ")
        .push_bind(vector)
        .push("::vector, id LIMIT ")
        .push_bind(i64::try_from(top_k).unwrap_or(i64::MAX));
    qb
}

/// Append a type-guarded numeric comparison on a metadata field.
fn push_comparison(qb: &mut QueryBuilder<'_, Postgres>, field: &str, op: &str, value: f64) {
    qb.push("(CASE WHEN jsonb_typeof(metadata -> ")
        .push_bind(field.to_string())
        .push(") = 'number' THEN (metadata ->> ")
        .push_bind(field.to_string())
        .push(")::double precision ")
        .push(op)
        .push(" ")
        .push_bind(value)
        .push(" ELSE FALSE END)");
}

/// Append a SQL predicate for `filter`, binding every field name and value.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &MetadataFilter) {
    match filter {
        MetadataFilter::Eq { field, value } if value.is_array() || value.is_object() => {
            qb.push("(metadata -> ")
                .push_bind(field.clone())
                .push(") = ")
                .push_bind(Json(value.clone()))
                .push("::jsonb");
        }
        MetadataFilter::Eq { field, value } => {
            // Scalar containment can use the GIN index.
            let mut containment = Map::new();
            containment.insert(field.clone(), value.clone());
            qb.push("metadata @> ").push_bind(Json(Value::Object(containment))).push("::jsonb");
        }
        MetadataFilter::Lt { field, value } => push_comparison(qb, field, "<", *value),
        MetadataFilter::Lte { field, value } => push_comparison(qb, field, "<=", *value),
        MetadataFilter::Gt { field, value } => push_comparison(qb, field, ">", *value),
        MetadataFilter::Gte { field, value } => push_comparison(qb, field, ">=", *value),
        MetadataFilter::And { filters } if filters.is_empty() => {
            qb.push("TRUE");
        }
        MetadataFilter::And { filters } => {
            qb.push("(");
            for (i, nested) in filters.iter().enumerate() {
                if i > 0 {
                    qb.push(" AND ");
                }
                push_filter(qb, nested);
            }
            qb.push(")");
        }
    }
}

fn metadata_from_row(row: &PgRow) -> Result<Metadata> {
    let Json(metadata): Json<Metadata> =
        row.try_get("metadata").map_err(PgVectorStore::map_err)?;
    Ok(metadata)
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn add_document(&self, id: &str, content: &str, metadata: Metadata) -> Result<()> {
        validate_document(id, content)?;
        self.initialize().await?;

        let embedding = self.embedder.embed(content).await?;
        self.check_dimensions(&embedding)?;
        self.upsert(id, content, &embedding, &metadata).await?;

        debug!(id, table = %self.table, "upserted document to pgvector");
        Ok(())
    }

    async fn add_documents(&self, documents: &[NewDocument]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        for document in documents {
            validate_document(&document.id, &document.content)?;
        }
        self.initialize().await?;

        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != documents.len() {
            return Err(RagError::EmbeddingError {
                provider: "batch".into(),
                message: format!(
                    "expected {} embeddings, provider returned {}",
                    documents.len(),
                    embeddings.len()
                ),
            });
        }

        // One statement per document: each upsert is atomic, the batch is not.
        for (document, embedding) in documents.iter().zip(&embeddings) {
            self.check_dimensions(embedding)?;
            self.upsert(&document.id, &document.content, embedding, &document.metadata).await?;
        }

        debug!(count = documents.len(), table = %self.table, "upserted batch to pgvector");
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        validate_search(query, top_k)?;
        self.initialize().await?;

        let query_embedding = self.embedder.embed_query(query).await?;
        self.check_dimensions(&query_embedding)?;
        if is_zero_norm(&query_embedding) {
            warn!(table = %self.table, "query embedding has zero magnitude; every score is 0");
        }

        let mut qb =
            build_search_query(&self.table, to_vector_literal(&query_embedding), filter, top_k);

        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;
        sqlx::query(&probes_statement()).execute(&mut *tx).await.map_err(Self::map_err)?;
        let rows = qb.build().fetch_all(&mut *tx).await.map_err(Self::map_err)?;
        tx.commit().await.map_err(Self::map_err)?;

        let results = rows
            .iter()
            .map(|row| {
                let score: f64 = row.try_get("score").map_err(Self::map_err)?;
                Ok(SearchResult {
                    document: VectorDocument {
                        id: row.try_get("id").map_err(Self::map_err)?,
                        content: row.try_get("content").map_err(Self::map_err)?,
                        embedding: Vec::new(),
                        metadata: metadata_from_row(row)?,
                    },
                    score: score as f32,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            top_k,
            filtered = filter.is_some(),
            result_count = results.len(),
            "pgvector search"
        );
        Ok(results)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.initialize().await?;
        let delete_sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        let result =
            sqlx::query(&delete_sql).bind(id).execute(&self.pool).await.map_err(Self::map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_filter(&self, filter: &MetadataFilter) -> Result<u64> {
        self.initialize().await?;
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        qb.push(&self.table).push(" WHERE ");
        push_filter(&mut qb, filter);

        let result = qb.build().execute(&self.pool).await.map_err(Self::map_err)?;
        let removed = result.rows_affected();
        debug!(removed, table = %self.table, "deleted documents by filter");
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.initialize().await?;
        let clear_sql = format!("DELETE FROM {}", self.table);
        sqlx::query(&clear_sql).execute(&self.pool).await.map_err(Self::map_err)?;
        debug!(table = %self.table, "cleared pgvector table");
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        self.initialize().await?;
        let count_sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 =
            sqlx::query_scalar(&count_sql).fetch_one(&self.pool).await.map_err(Self::map_err)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn get_all(&self) -> Result<Vec<VectorDocument>> {
        self.initialize().await?;
        let select_sql = format!(
            "SELECT id, content, embedding::text AS embedding, metadata \
             FROM {} ORDER BY created_at, id",
            self.table
        );
        let rows = sqlx::query(&select_sql).fetch_all(&self.pool).await.map_err(Self::map_err)?;

        rows.iter()
            .map(|row| {
                let embedding: Option<String> = row.try_get("embedding").map_err(Self::map_err)?;
                Ok(VectorDocument {
                    id: row.try_get("id").map_err(Self::map_err)?,
                    content: row.try_get("content").map_err(Self::map_err)?,
                    embedding: embedding
                        .as_deref()
                        .map(parse_vector_literal)
                        .transpose()?
                        .unwrap_or_default(),
                    metadata: metadata_from_row(row)?,
                })
            })
            .collect()
    }

    async fn distinct_values(&self, field: &str) -> Result<Vec<Value>> {
        self.initialize().await?;
        let distinct_sql = format!(
            "SELECT DISTINCT metadata -> $1 AS value FROM {} \
             WHERE metadata -> $1 IS NOT NULL ORDER BY value",
            self.table
        );
        let values: Vec<Value> = sqlx::query_scalar(&distinct_sql)
            .bind(field)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_err)?;
        Ok(values)
    }
}

//! Metadata backend (§4.H) over PostgreSQL.

use atlas_core::backend::MetadataBackend;
use atlas_core::model::{Chunk, CollectionStats, QntmKey, Source, SourceStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

pub struct PostgresMetadataBackend {
    pool: PgPool,
}

impl PostgresMetadataBackend {
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Idempotent schema setup, mirroring the abbreviated schema in §4.H.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id TEXT PRIMARY KEY,
                path TEXT UNIQUE NOT NULL,
                content_hash TEXT NOT NULL,
                file_mtime TIMESTAMPTZ NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES sources(id),
                chunk_index BIGINT NOT NULL,
                total_chunks BIGINT NOT NULL,
                char_count BIGINT NOT NULL,
                payload JSONB NOT NULL,
                embedding_model TEXT NOT NULL,
                embedding_strategy TEXT NOT NULL,
                content_type TEXT NOT NULL,
                consolidation_level INT NOT NULL,
                superseded_by TEXT,
                deletion_eligible BOOLEAN NOT NULL,
                access_count BIGINT NOT NULL,
                last_accessed_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS qntm_keys (
                key TEXT PRIMARY KEY,
                first_seen_at TIMESTAMPTZ NOT NULL,
                last_seen_at TIMESTAMPTZ NOT NULL,
                usage_count BIGINT NOT NULL,
                last_used_in_chunk_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_qntm_keys (
                chunk_id TEXT NOT NULL,
                qntm_key TEXT NOT NULL,
                PRIMARY KEY (chunk_id, qntm_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collection_stats (
                collection_name TEXT PRIMARY KEY,
                total_chunks BIGINT NOT NULL,
                total_files BIGINT NOT NULL,
                total_chars BIGINT NOT NULL,
                last_updated TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_source(row: &sqlx::postgres::PgRow) -> anyhow::Result<Source> {
        let status: String = row.try_get("status")?;
        Ok(Source {
            source_id: row.try_get("id")?,
            path: row.try_get("path")?,
            content_hash: row.try_get("content_hash")?,
            file_mtime: row.try_get("file_mtime")?,
            status: if status == "deleted" {
                SourceStatus::Deleted
            } else {
                SourceStatus::Active
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_chunk(row: &sqlx::postgres::PgRow) -> anyhow::Result<Chunk> {
        let payload_json: serde_json::Value = row.try_get("payload")?;
        let payload = serde_json::from_value(payload_json)?;
        let embedding_strategy_raw: String = row.try_get("embedding_strategy")?;
        let content_type_raw: String = row.try_get("content_type")?;
        Ok(Chunk {
            chunk_id: row.try_get("id")?,
            source_id: row.try_get("source_id")?,
            chunk_index: row.try_get("chunk_index")?,
            total_chunks: row.try_get("total_chunks")?,
            char_count: row.try_get("char_count")?,
            payload,
            embedding_model: row.try_get("embedding_model")?,
            embedding_strategy: serde_json::from_value(serde_json::Value::String(embedding_strategy_raw))?,
            content_type: serde_json::from_value(serde_json::Value::String(content_type_raw))?,
            consolidation_level: row.try_get("consolidation_level")?,
            superseded_by: row.try_get("superseded_by")?,
            deletion_eligible: row.try_get("deletion_eligible")?,
            access_count: row.try_get("access_count")?,
            last_accessed_at: row.try_get("last_accessed_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl MetadataBackend for PostgresMetadataBackend {
    async fn upsert_source(&self, source: &Source) -> anyhow::Result<()> {
        let status = match source.status {
            SourceStatus::Active => "active",
            SourceStatus::Deleted => "deleted",
        };
        sqlx::query(
            r#"
            INSERT INTO sources (id, path, content_hash, file_mtime, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (path) DO UPDATE SET
                content_hash = EXCLUDED.content_hash,
                file_mtime = EXCLUDED.file_mtime,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&source.source_id)
        .bind(&source.path)
        .bind(&source.content_hash)
        .bind(source.file_mtime)
        .bind(status)
        .bind(source.created_at)
        .bind(source.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_source_by_path(&self, path: &str) -> anyhow::Result<Option<Source>> {
        let row = sqlx::query("SELECT * FROM sources WHERE path = $1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_source).transpose()
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            let embedding_strategy = serde_json::to_value(chunk.embedding_strategy)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            let content_type = serde_json::to_value(chunk.content_type)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            let payload = serde_json::to_value(&chunk.payload)?;

            sqlx::query(
                r#"
                INSERT INTO chunks (
                    id, source_id, chunk_index, total_chunks, char_count, payload,
                    embedding_model, embedding_strategy, content_type, consolidation_level,
                    superseded_by, deletion_eligible, access_count, last_accessed_at, created_at
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
                ON CONFLICT (id) DO UPDATE SET
                    chunk_index = EXCLUDED.chunk_index,
                    total_chunks = EXCLUDED.total_chunks,
                    char_count = EXCLUDED.char_count,
                    payload = EXCLUDED.payload,
                    embedding_model = EXCLUDED.embedding_model,
                    embedding_strategy = EXCLUDED.embedding_strategy,
                    content_type = EXCLUDED.content_type,
                    consolidation_level = EXCLUDED.consolidation_level,
                    superseded_by = EXCLUDED.superseded_by,
                    deletion_eligible = EXCLUDED.deletion_eligible
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.source_id)
            .bind(chunk.chunk_index)
            .bind(chunk.total_chunks)
            .bind(chunk.char_count)
            .bind(payload)
            .bind(&chunk.embedding_model)
            .bind(embedding_strategy)
            .bind(content_type)
            .bind(chunk.consolidation_level)
            .bind(&chunk.superseded_by)
            .bind(chunk.deletion_eligible)
            .bind(chunk.access_count)
            .bind(chunk.last_accessed_at)
            .bind(chunk.created_at)
            .execute(&mut *tx)
            .await?;

            // Transactional QNTM-key bookkeeping alongside the chunk write.
            for key in &chunk.payload.qntm_keys {
                sqlx::query(
                    r#"
                    INSERT INTO qntm_keys (key, first_seen_at, last_seen_at, usage_count, last_used_in_chunk_id)
                    VALUES ($1, now(), now(), 1, $2)
                    ON CONFLICT (key) DO UPDATE SET
                        last_seen_at = now(),
                        usage_count = qntm_keys.usage_count + 1,
                        last_used_in_chunk_id = EXCLUDED.last_used_in_chunk_id
                    "#,
                )
                .bind(key)
                .bind(&chunk.chunk_id)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    "INSERT INTO chunk_qntm_keys (chunk_id, qntm_key) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                )
                .bind(&chunk.chunk_id)
                .bind(key)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_chunk_by_id(&self, id: &str) -> anyhow::Result<Option<Chunk>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_chunk).transpose()
    }

    async fn get_chunks_by_source(&self, source_id: &str) -> anyhow::Result<Vec<Chunk>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE source_id = $1")
            .bind(source_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_chunk).collect()
    }

    async fn get_all_qntm_keys(&self) -> anyhow::Result<Vec<QntmKey>> {
        let rows = sqlx::query("SELECT key, first_seen_at, last_seen_at, usage_count FROM qntm_keys")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                Ok(QntmKey {
                    key: row.try_get("key")?,
                    first_seen_at: row.try_get::<DateTime<Utc>, _>("first_seen_at")?,
                    last_seen_at: row.try_get::<DateTime<Utc>, _>("last_seen_at")?,
                    usage_count: row.try_get("usage_count")?,
                })
            })
            .collect()
    }

    async fn record_qntm_keys(&self, chunk_id: &str, keys: &[String]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query(
                r#"
                INSERT INTO qntm_keys (key, first_seen_at, last_seen_at, usage_count, last_used_in_chunk_id)
                VALUES ($1, now(), now(), 1, $2)
                ON CONFLICT (key) DO UPDATE SET
                    last_seen_at = now(),
                    usage_count = qntm_keys.usage_count + 1,
                    last_used_in_chunk_id = EXCLUDED.last_used_in_chunk_id
                "#,
            )
            .bind(key)
            .bind(chunk_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_collection_stats(&self, collection: &str) -> anyhow::Result<CollectionStats> {
        let row = sqlx::query("SELECT * FROM collection_stats WHERE collection_name = $1")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => CollectionStats {
                collection_name: row.try_get("collection_name")?,
                total_chunks: row.try_get("total_chunks")?,
                total_files: row.try_get("total_files")?,
                total_chars: row.try_get("total_chars")?,
                last_updated: row.try_get("last_updated")?,
            },
            None => CollectionStats {
                collection_name: collection.to_string(),
                ..Default::default()
            },
        })
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

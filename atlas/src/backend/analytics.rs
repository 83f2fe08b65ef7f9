//! Analytics backend (§4.K): an embedded, append-only SQLite timeline table
//! plus bulk export. Kept on its own SQLite file rather than the Postgres
//! metadata schema so a slow or locked analytics store can never block an
//! ingestion write — §4.L treats this tier as eventually consistent and
//! entirely optional.

use atlas_core::backend::{
    AnalyticsBackend, ExportFormat, ExportRequest, ExportResult, Granularity, TimelinePoint,
    TimelineQuery,
};
use atlas_core::model::Chunk;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

pub struct SqliteAnalyticsBackend {
    pool: SqlitePool,
}

impl SqliteAnalyticsBackend {
    pub async fn connect(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_events (
                chunk_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                content_type TEXT NOT NULL,
                char_count INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn granularity_strftime(g: Granularity) -> &'static str {
    match g {
        Granularity::Hour => "%Y-%m-%dT%H:00:00Z",
        Granularity::Day => "%Y-%m-%dT00:00:00Z",
        Granularity::Week => "%Y-%W",
        Granularity::Month => "%Y-%m",
    }
}

#[async_trait]
impl AnalyticsBackend for SqliteAnalyticsBackend {
    async fn record_chunks(&self, chunks: &[Chunk]) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            let content_type = serde_json::to_value(chunk.content_type)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            sqlx::query(
                "INSERT INTO chunk_events (chunk_id, source_id, content_type, char_count, recorded_at) VALUES (?,?,?,?,?)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.source_id)
            .bind(content_type)
            .bind(chunk.char_count)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query_timeline(&self, query: TimelineQuery) -> anyhow::Result<Vec<TimelinePoint>> {
        let fmt = granularity_strftime(query.granularity.unwrap_or(Granularity::Day));
        let since = query.since.map(|t| t.to_rfc3339());
        let until = query.until.map(|t| t.to_rfc3339());

        let rows = sqlx::query(
            "SELECT strftime(?, recorded_at) AS bucket, count(*) AS n
             FROM chunk_events
             WHERE (? IS NULL OR recorded_at >= ?)
               AND (? IS NULL OR recorded_at <= ?)
             GROUP BY bucket
             ORDER BY bucket",
        )
        .bind(fmt)
        .bind(&since)
        .bind(&since)
        .bind(&until)
        .bind(&until)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let bucket: String = row.try_get("bucket")?;
                let timestamp = chrono::DateTime::parse_from_rfc3339(&bucket)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                Ok(TimelinePoint {
                    timestamp,
                    count: row.try_get("n")?,
                })
            })
            .collect()
    }

    async fn export(&self, request: ExportRequest) -> anyhow::Result<ExportResult> {
        let start = std::time::Instant::now();
        let since = request.since.map(|t| t.to_rfc3339());
        let until = request.until.map(|t| t.to_rfc3339());

        let rows = sqlx::query(
            "SELECT chunk_id, source_id, content_type, char_count, recorded_at
             FROM chunk_events
             WHERE (? IS NULL OR recorded_at >= ?)
               AND (? IS NULL OR recorded_at <= ?)
             ORDER BY recorded_at",
        )
        .bind(&since)
        .bind(&since)
        .bind(&until)
        .bind(&until)
        .fetch_all(&self.pool)
        .await?;

        std::fs::create_dir_all(&request.output_dir)?;
        let row_count = rows.len() as u64;

        let files = match request.format {
            ExportFormat::Json => {
                let mut records = Vec::with_capacity(rows.len());
                for row in &rows {
                    records.push(serde_json::json!({
                        "chunk_id": row.try_get::<String, _>("chunk_id")?,
                        "source_id": row.try_get::<String, _>("source_id")?,
                        "content_type": row.try_get::<String, _>("content_type")?,
                        "char_count": row.try_get::<i64, _>("char_count")?,
                        "recorded_at": row.try_get::<String, _>("recorded_at")?,
                    }));
                }
                let path = format!("{}/chunk_events.json", request.output_dir);
                std::fs::write(&path, serde_json::to_vec_pretty(&records)?)?;
                vec![path]
            }
            ExportFormat::Csv => {
                let path = format!("{}/chunk_events.csv", request.output_dir);
                let mut file = std::fs::File::create(&path)?;
                writeln!(file, "chunk_id,source_id,content_type,char_count,recorded_at")?;
                for row in &rows {
                    writeln!(
                        file,
                        "{},{},{},{},{}",
                        row.try_get::<String, _>("chunk_id")?,
                        row.try_get::<String, _>("source_id")?,
                        row.try_get::<String, _>("content_type")?,
                        row.try_get::<i64, _>("char_count")?,
                        row.try_get::<String, _>("recorded_at")?,
                    )?;
                }
                vec![path]
            }
            ExportFormat::Parquet => {
                let path = format!("{}/chunk_events.parquet", request.output_dir);
                write_parquet(&path, &rows)?;
                vec![path]
            }
        };

        Ok(ExportResult {
            files,
            row_count,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn health(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

fn write_parquet(path: &str, rows: &[sqlx::sqlite::SqliteRow]) -> anyhow::Result<()> {
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    let mut chunk_ids = Vec::with_capacity(rows.len());
    let mut source_ids = Vec::with_capacity(rows.len());
    let mut content_types = Vec::with_capacity(rows.len());
    let mut char_counts = Vec::with_capacity(rows.len());
    let mut recorded_ats = Vec::with_capacity(rows.len());

    for row in rows {
        chunk_ids.push(row.try_get::<String, _>("chunk_id")?);
        source_ids.push(row.try_get::<String, _>("source_id")?);
        content_types.push(row.try_get::<String, _>("content_type")?);
        char_counts.push(row.try_get::<i64, _>("char_count")?);
        recorded_ats.push(row.try_get::<String, _>("recorded_at")?);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("source_id", DataType::Utf8, false),
        Field::new("content_type", DataType::Utf8, false),
        Field::new("char_count", DataType::Int64, false),
        Field::new("recorded_at", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(chunk_ids)),
            Arc::new(StringArray::from(source_ids)),
            Arc::new(StringArray::from(content_types)),
            Arc::new(Int64Array::from(char_counts)),
            Arc::new(StringArray::from(recorded_ats)),
        ],
    )?;

    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

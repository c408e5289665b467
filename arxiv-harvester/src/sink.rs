use crate::traits::RecordSink;
use crate::types::{Record, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, info};

/// PostgreSQL destination for crawled records, one row per paper id.
pub struct PgRecordSink {
    pool: PgPool,
}

impl PgRecordSink {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS paper_crawl (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                abstract TEXT NOT NULL,
                categories TEXT[] NOT NULL,
                authors TEXT[] NOT NULL,
                published DATE NULL,
                updated DATE NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        debug!("paper_crawl schema ready");
        Ok(())
    }
}

#[async_trait]
impl RecordSink for PgRecordSink {
    async fn upsert(&self, records: &[Record]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO paper_crawl (id, title, abstract, categories, authors, published, updated)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id)
                DO UPDATE SET
                    title = EXCLUDED.title,
                    abstract = EXCLUDED.abstract,
                    categories = EXCLUDED.categories,
                    authors = EXCLUDED.authors,
                    published = EXCLUDED.published,
                    updated = EXCLUDED.updated
                "#,
            )
            .bind(&record.id)
            .bind(&record.title)
            .bind(&record.abstract_text)
            .bind(&record.categories)
            .bind(&record.authors)
            .bind(sql_date(&record.published))
            .bind(sql_date(&record.updated))
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;

        info!("DB: upserted {} records into paper_crawl", written);
        Ok(written)
    }
}

/// Empty or unparsable dates are stored as NULL.
fn sql_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

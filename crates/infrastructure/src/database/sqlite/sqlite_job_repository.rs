use async_trait::async_trait;
use chrono::Utc;
use fleetcron_core::{JobRepository, SchedulerError, SchedulerResult, StoredJob};
use sqlx::{Row, SqlitePool};
use tracing::warn;

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn list_all(&self) -> SchedulerResult<Vec<StoredJob>> {
        let rows = sqlx::query("SELECT job_id, document FROM jobs ORDER BY job_id")
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            let job_id: String = row.try_get("job_id")?;
            let raw: String = row.try_get("document")?;
            match serde_json::from_str(&raw) {
                Ok(document) => jobs.push(StoredJob { job_id, document }),
                Err(e) => warn!("任务 {job_id} 的文档不是合法JSON，已跳过: {e}"),
            }
        }
        Ok(jobs)
    }

    async fn upsert(&self, job: &StoredJob) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, document, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT(job_id) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&job.job_id)
        .bind(serde_json::to_string(&job.document)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }
}

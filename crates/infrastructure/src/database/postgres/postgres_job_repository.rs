use async_trait::async_trait;
use fleetcron_core::{JobRepository, SchedulerError, SchedulerResult, StoredJob};
use sqlx::{PgPool, Row};

pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn list_all(&self) -> SchedulerResult<Vec<StoredJob>> {
        let rows = sqlx::query("SELECT job_id, document FROM jobs ORDER BY job_id")
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        rows.iter()
            .map(|row| {
                Ok(StoredJob {
                    job_id: row.try_get("job_id")?,
                    document: row.try_get("document")?,
                })
            })
            .collect()
    }

    async fn upsert(&self, job: &StoredJob) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, document, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (job_id) DO UPDATE SET
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.document)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }
}

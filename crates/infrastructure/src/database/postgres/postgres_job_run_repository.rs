use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetcron_core::{
    JobRun, JobRunKey, JobRunRepository, JobRunResult, JobRunStatus, SchedulerError,
    SchedulerResult, StepRecord,
};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;

const JOB_RUN_COLUMNS: &str = "job_id, scheduled_for, claim_scope, machine_id, status, attempts, \
     started_at, finished_at, error_detail, steps, created_at";

pub struct PostgresJobRunRepository {
    pool: PgPool,
}

impl PostgresJobRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_job_run(row: &sqlx::postgres::PgRow) -> SchedulerResult<JobRun> {
        let status: String = row.try_get("status")?;
        let attempts: i32 = row.try_get("attempts")?;
        let steps: Json<Vec<StepRecord>> = row.try_get("steps")?;
        Ok(JobRun {
            job_id: row.try_get("job_id")?,
            scheduled_for: row.try_get("scheduled_for")?,
            claim_scope: row.try_get("claim_scope")?,
            machine_id: row.try_get("machine_id")?,
            status: MappingHelpers::parse_enum::<JobRunStatus>(&status, "job_runs.status")?,
            attempts: attempts.max(0) as u32,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            error_detail: row.try_get("error_detail")?,
            steps: steps.0,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl JobRunRepository for PostgresJobRunRepository {
    #[instrument(skip(self, run), fields(job_id = %run.job_id, scheduled_for = %run.scheduled_for))]
    async fn try_claim(&self, run: &JobRun) -> SchedulerResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_runs (job_id, scheduled_for, claim_scope, machine_id, status, attempts, steps, created_at)
            VALUES ($1, $2, $3, $4, $5, 0, '[]'::jsonb, $6)
            ON CONFLICT (job_id, scheduled_for, claim_scope) DO NOTHING
            "#,
        )
        .bind(&run.job_id)
        .bind(run.scheduled_for)
        .bind(&run.claim_scope)
        .bind(&run.machine_id)
        .bind(run.status.as_str())
        .bind(run.created_at)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let won = result.rows_affected() == 1;
        debug!("认领插入结果: {}", if won { "成功" } else { "已存在" });
        Ok(won)
    }

    async fn mark_running(&self, key: &JobRunKey, started_at: DateTime<Utc>) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            UPDATE job_runs SET status = 'running', started_at = $4
            WHERE job_id = $1 AND scheduled_for = $2 AND claim_scope = $3
            "#,
        )
        .bind(&key.job_id)
        .bind(key.scheduled_for)
        .bind(&key.claim_scope)
        .bind(started_at)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn finish(
        &self,
        key: &JobRunKey,
        result: &JobRunResult,
        finished_at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            UPDATE job_runs
            SET status = $4, attempts = $5, error_detail = $6, steps = $7, finished_at = $8
            WHERE job_id = $1 AND scheduled_for = $2 AND claim_scope = $3
            "#,
        )
        .bind(&key.job_id)
        .bind(key.scheduled_for)
        .bind(&key.claim_scope)
        .bind(result.status.as_str())
        .bind(result.attempts as i32)
        .bind(&result.error_detail)
        .bind(Json(&result.steps))
        .bind(finished_at)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn get(&self, key: &JobRunKey) -> SchedulerResult<Option<JobRun>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_RUN_COLUMNS} FROM job_runs WHERE job_id = $1 AND scheduled_for = $2 AND claim_scope = $3"
        ))
        .bind(&key.job_id)
        .bind(key.scheduled_for)
        .bind(&key.claim_scope)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_job_run).transpose()
    }

    async fn list_for_tick(&self, scheduled_for: DateTime<Utc>) -> SchedulerResult<Vec<JobRun>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_RUN_COLUMNS} FROM job_runs WHERE scheduled_for = $1 ORDER BY job_id, claim_scope"
        ))
        .bind(scheduled_for)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_job_run).collect()
    }
}

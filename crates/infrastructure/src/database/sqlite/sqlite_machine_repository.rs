use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetcron_core::{Machine, MachineRepository, MachineStatus, SchedulerError, SchedulerResult};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::database::mapping::MappingHelpers;

const MACHINE_COLUMNS: &str =
    "machine_id, hostname, machine_order, serial, last_seen, status, registered_at";

pub struct SqliteMachineRepository {
    pool: SqlitePool,
}

impl SqliteMachineRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_machine(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<Machine> {
        let status: String = row.try_get("status")?;
        Ok(Machine {
            machine_id: row.try_get("machine_id")?,
            hostname: row.try_get("hostname")?,
            order: row.try_get("machine_order")?,
            serial: row.try_get("serial")?,
            last_seen: row.try_get("last_seen")?,
            status: MappingHelpers::parse_enum(&status, "machines.status")?,
            registered_at: row.try_get("registered_at")?,
        })
    }
}

#[async_trait]
impl MachineRepository for SqliteMachineRepository {
    async fn get(&self, machine_id: &str) -> SchedulerResult<Option<Machine>> {
        let row = sqlx::query(&format!(
            "SELECT {MACHINE_COLUMNS} FROM machines WHERE machine_id = $1"
        ))
        .bind(machine_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_machine).transpose()
    }

    async fn register(&self, machine: &Machine) -> SchedulerResult<Machine> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO machines (machine_id, hostname, machine_order, serial, last_seen, status, registered_at)
            VALUES ($1, $2, $3, $3, $4, $5, $6)
            ON CONFLICT(machine_id) DO UPDATE SET
                hostname = excluded.hostname,
                last_seen = excluded.last_seen,
                status = excluded.status,
                serial = machines.machine_order
            RETURNING {MACHINE_COLUMNS}
            "#
        ))
        .bind(&machine.machine_id)
        .bind(&machine.hostname)
        .bind(machine.order)
        .bind(machine.last_seen)
        .bind(machine.status.as_str())
        .bind(machine.registered_at)
        .fetch_one(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        debug!("注册机器成功: {}", machine.machine_id);
        Self::row_to_machine(&row)
    }

    async fn touch_heartbeat(&self, machine_id: &str, at: DateTime<Utc>) -> SchedulerResult<bool> {
        let result = sqlx::query(
            "UPDATE machines SET last_seen = $2, status = 'online', serial = machine_order WHERE machine_id = $1",
        )
        .bind(machine_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_status(&self, machine_id: &str, status: MachineStatus) -> SchedulerResult<()> {
        let result = sqlx::query("UPDATE machines SET status = $2 WHERE machine_id = $1")
            .bind(machine_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::MachineNotFound {
                id: machine_id.to_string(),
            });
        }
        Ok(())
    }

    async fn list(&self) -> SchedulerResult<Vec<Machine>> {
        let rows = sqlx::query(&format!(
            "SELECT {MACHINE_COLUMNS} FROM machines ORDER BY machine_order, machine_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_machine).collect()
    }
}

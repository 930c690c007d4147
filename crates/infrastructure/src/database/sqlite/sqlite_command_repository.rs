use async_trait::async_trait;
use chrono::Utc;
use fleetcron_core::{
    Command, CommandRepository, CommandTarget, CommandType, SchedulerError, SchedulerResult,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::database::mapping::MappingHelpers;

pub struct SqliteCommandRepository {
    pool: SqlitePool,
}

impl SqliteCommandRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_command(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<Command> {
        let id: String = row.try_get("id")?;
        let command_type: String = row.try_get("command_type")?;
        let target: String = row.try_get("target")?;
        let payload: Option<String> = row.try_get("payload")?;
        Ok(Command {
            id: MappingHelpers::parse_uuid_sqlite(&id)?,
            command_type: MappingHelpers::parse_enum::<CommandType>(
                &command_type,
                "commands.command_type",
            )?,
            target: CommandTarget::parse(&target),
            issued_at: row.try_get("issued_at")?,
            consumed_by: MappingHelpers::split_consumed_by(row.try_get("consumed_by")?),
            payload: payload.map(|raw| serde_json::from_str(&raw)).transpose()?,
        })
    }
}

#[async_trait]
impl CommandRepository for SqliteCommandRepository {
    async fn insert(&self, command: &Command) -> SchedulerResult<()> {
        let payload = command
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO commands (id, command_type, target, issued_at, payload) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(command.id.to_string())
        .bind(command.command_type.as_str())
        .bind(command.target.as_str())
        .bind(command.issued_at)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn list_pending_for(&self, machine_id: &str) -> SchedulerResult<Vec<Command>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.command_type, c.target, c.issued_at, c.payload,
                   group_concat(cc.machine_id, ',') AS consumed_by
            FROM commands c
            LEFT JOIN command_consumptions cc ON cc.command_id = c.id
            WHERE (c.target = 'all' OR c.target = $1)
              AND NOT EXISTS (
                  SELECT 1 FROM command_consumptions mine
                  WHERE mine.command_id = c.id AND mine.machine_id = $1
              )
            GROUP BY c.id
            ORDER BY c.issued_at
            "#,
        )
        .bind(machine_id)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let mut commands = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_command(row) {
                Ok(command) => commands.push(command),
                Err(e) => debug!("忽略无法识别的命令: {e}"),
            }
        }
        Ok(commands)
    }

    async fn mark_consumed(&self, command_id: Uuid, machine_id: &str) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO command_consumptions (command_id, machine_id, consumed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT(command_id, machine_id) DO NOTHING
            "#,
        )
        .bind(command_id.to_string())
        .bind(machine_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(())
    }
}

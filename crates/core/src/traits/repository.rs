//! 共享存储仓储接口
//!
//! 四个集合各对应一个接口：
//! - `MachineRepository` - 机器注册表与心跳
//! - `JobRepository` - 任务目录（代理只读）
//! - `JobRunRepository` - 认领与运行结果
//! - `CommandRepository` - 运维命令与按机器的消费标记
//!
//! 所有实现都必须是 `Send + Sync`，并返回 `SchedulerResult<T>`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Command, JobRun, JobRunKey, JobRunResult, Machine, MachineStatus, StoredJob,
};
use crate::SchedulerResult;

/// 机器仓储接口
#[async_trait]
pub trait MachineRepository: Send + Sync {
    async fn get(&self, machine_id: &str) -> SchedulerResult<Option<Machine>>;

    /// 注册机器
    ///
    /// 记录不存在时按传入值插入；已存在时只更新主机名、状态和 last_seen，
    /// 不会覆盖运维设置的顺序号。返回存储中的最终记录。
    async fn register(&self, machine: &Machine) -> SchedulerResult<Machine>;

    /// 刷新心跳并标记为在线，同时把 serial 同步为当前 order。
    /// 记录不存在时返回 false
    async fn touch_heartbeat(&self, machine_id: &str, at: DateTime<Utc>) -> SchedulerResult<bool>;

    async fn set_status(&self, machine_id: &str, status: MachineStatus) -> SchedulerResult<()>;

    /// 列出全部机器（包括已过期的，从不删除）
    async fn list(&self) -> SchedulerResult<Vec<Machine>>;
}

/// 任务仓储接口
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 按 job_id 排序返回全部任务文档，由调用方解析与过滤
    async fn list_all(&self) -> SchedulerResult<Vec<StoredJob>>;

    async fn upsert(&self, job: &StoredJob) -> SchedulerResult<()>;
}

/// 任务运行仓储接口
#[async_trait]
pub trait JobRunRepository: Send + Sync {
    /// 原子地插入 pending 记录
    ///
    /// 以 `(job_id, scheduled_for, claim_scope)` 为唯一键，全舰队只有一次插入能成功。
    /// 返回 true 表示认领成功，false 表示已被他人认领。
    async fn try_claim(&self, run: &JobRun) -> SchedulerResult<bool>;

    async fn mark_running(&self, key: &JobRunKey, started_at: DateTime<Utc>) -> SchedulerResult<()>;

    async fn finish(
        &self,
        key: &JobRunKey,
        result: &JobRunResult,
        finished_at: DateTime<Utc>,
    ) -> SchedulerResult<()>;

    async fn get(&self, key: &JobRunKey) -> SchedulerResult<Option<JobRun>>;

    async fn list_for_tick(&self, scheduled_for: DateTime<Utc>) -> SchedulerResult<Vec<JobRun>>;
}

/// 命令仓储接口
#[async_trait]
pub trait CommandRepository: Send + Sync {
    async fn insert(&self, command: &Command) -> SchedulerResult<()>;

    /// 目标为 `all` 或该机器、且该机器尚未消费的命令，按发出时间排序
    async fn list_pending_for(&self, machine_id: &str) -> SchedulerResult<Vec<Command>>;

    /// 幂等：重复标记不报错
    async fn mark_consumed(&self, command_id: Uuid, machine_id: &str) -> SchedulerResult<()>;
}

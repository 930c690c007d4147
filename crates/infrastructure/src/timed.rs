//! 给仓储接口统一加上存储超时的装饰器

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetcron_core::{
    Command, CommandRepository, JobRepository, JobRun, JobRunKey, JobRunRepository, JobRunResult,
    Machine, MachineRepository, MachineStatus, SchedulerResult, StoredJob,
};
use uuid::Uuid;

use crate::timeout_handler::TimeoutHandler;

pub struct TimedMachineRepository {
    inner: Arc<dyn MachineRepository>,
    timeouts: TimeoutHandler,
}

impl TimedMachineRepository {
    pub fn new(inner: Arc<dyn MachineRepository>, timeouts: TimeoutHandler) -> Self {
        Self { inner, timeouts }
    }
}

#[async_trait]
impl MachineRepository for TimedMachineRepository {
    async fn get(&self, machine_id: &str) -> SchedulerResult<Option<Machine>> {
        self.timeouts
            .store_operation(self.inner.get(machine_id), "machines.get")
            .await
    }

    async fn register(&self, machine: &Machine) -> SchedulerResult<Machine> {
        self.timeouts
            .store_operation(self.inner.register(machine), "machines.register")
            .await
    }

    async fn touch_heartbeat(&self, machine_id: &str, at: DateTime<Utc>) -> SchedulerResult<bool> {
        self.timeouts
            .store_operation(
                self.inner.touch_heartbeat(machine_id, at),
                "machines.touch_heartbeat",
            )
            .await
    }

    async fn set_status(&self, machine_id: &str, status: MachineStatus) -> SchedulerResult<()> {
        self.timeouts
            .store_operation(self.inner.set_status(machine_id, status), "machines.set_status")
            .await
    }

    async fn list(&self) -> SchedulerResult<Vec<Machine>> {
        self.timeouts
            .store_operation(self.inner.list(), "machines.list")
            .await
    }
}

pub struct TimedJobRepository {
    inner: Arc<dyn JobRepository>,
    timeouts: TimeoutHandler,
}

impl TimedJobRepository {
    pub fn new(inner: Arc<dyn JobRepository>, timeouts: TimeoutHandler) -> Self {
        Self { inner, timeouts }
    }
}

#[async_trait]
impl JobRepository for TimedJobRepository {
    async fn list_all(&self) -> SchedulerResult<Vec<StoredJob>> {
        self.timeouts
            .store_operation(self.inner.list_all(), "jobs.list_all")
            .await
    }

    async fn upsert(&self, job: &StoredJob) -> SchedulerResult<()> {
        self.timeouts
            .store_operation(self.inner.upsert(job), "jobs.upsert")
            .await
    }
}

pub struct TimedJobRunRepository {
    inner: Arc<dyn JobRunRepository>,
    timeouts: TimeoutHandler,
}

impl TimedJobRunRepository {
    pub fn new(inner: Arc<dyn JobRunRepository>, timeouts: TimeoutHandler) -> Self {
        Self { inner, timeouts }
    }
}

#[async_trait]
impl JobRunRepository for TimedJobRunRepository {
    async fn try_claim(&self, run: &JobRun) -> SchedulerResult<bool> {
        self.timeouts
            .store_operation(self.inner.try_claim(run), "job_runs.try_claim")
            .await
    }

    async fn mark_running(&self, key: &JobRunKey, started_at: DateTime<Utc>) -> SchedulerResult<()> {
        self.timeouts
            .store_operation(self.inner.mark_running(key, started_at), "job_runs.mark_running")
            .await
    }

    async fn finish(
        &self,
        key: &JobRunKey,
        result: &JobRunResult,
        finished_at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        self.timeouts
            .store_operation(self.inner.finish(key, result, finished_at), "job_runs.finish")
            .await
    }

    async fn get(&self, key: &JobRunKey) -> SchedulerResult<Option<JobRun>> {
        self.timeouts
            .store_operation(self.inner.get(key), "job_runs.get")
            .await
    }

    async fn list_for_tick(&self, scheduled_for: DateTime<Utc>) -> SchedulerResult<Vec<JobRun>> {
        self.timeouts
            .store_operation(self.inner.list_for_tick(scheduled_for), "job_runs.list_for_tick")
            .await
    }
}

pub struct TimedCommandRepository {
    inner: Arc<dyn CommandRepository>,
    timeouts: TimeoutHandler,
}

impl TimedCommandRepository {
    pub fn new(inner: Arc<dyn CommandRepository>, timeouts: TimeoutHandler) -> Self {
        Self { inner, timeouts }
    }
}

#[async_trait]
impl CommandRepository for TimedCommandRepository {
    async fn insert(&self, command: &Command) -> SchedulerResult<()> {
        self.timeouts
            .store_operation(self.inner.insert(command), "commands.insert")
            .await
    }

    async fn list_pending_for(&self, machine_id: &str) -> SchedulerResult<Vec<Command>> {
        self.timeouts
            .store_operation(self.inner.list_pending_for(machine_id), "commands.list_pending_for")
            .await
    }

    async fn mark_consumed(&self, command_id: Uuid, machine_id: &str) -> SchedulerResult<()> {
        self.timeouts
            .store_operation(
                self.inner.mark_consumed(command_id, machine_id),
                "commands.mark_consumed",
            )
            .await
    }
}

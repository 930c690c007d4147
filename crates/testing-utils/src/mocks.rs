//! 仓储接口与执行器的内存实现

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetcron_core::{
    Command, CommandRepository, JobDefinition, JobExecutor, JobRepository, JobRun, JobRunKey,
    JobRunRepository, JobRunResult, JobRunStatus, Machine, MachineRepository, MachineStatus,
    RuntimeSettings, SchedulerError, SchedulerResult, SettingsLoader, StoredJob, Tick,
};
use uuid::Uuid;

/// 可切换的“存储不可达”开关
#[derive(Debug, Clone, Default)]
pub struct Availability {
    down: Arc<AtomicBool>,
}

impl Availability {
    pub fn set_unavailable(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> SchedulerResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(SchedulerError::StoreUnavailable("模拟的存储故障".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockMachineRepository {
    machines: Arc<Mutex<HashMap<String, Machine>>>,
    availability: Availability,
}

impl MockMachineRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_machines(machines: Vec<Machine>) -> Self {
        let repo = Self::new();
        for machine in machines {
            repo.insert(machine);
        }
        repo
    }

    pub fn insert(&self, machine: Machine) {
        self.machines
            .lock()
            .unwrap()
            .insert(machine.machine_id.clone(), machine);
    }

    /// 模拟运维修改顺序号
    pub fn set_order(&self, machine_id: &str, order: i32) {
        if let Some(machine) = self.machines.lock().unwrap().get_mut(machine_id) {
            machine.order = order;
        }
    }

    pub fn set_last_seen(&self, machine_id: &str, at: DateTime<Utc>) {
        if let Some(machine) = self.machines.lock().unwrap().get_mut(machine_id) {
            machine.last_seen = at;
        }
    }

    pub fn snapshot(&self, machine_id: &str) -> Option<Machine> {
        self.machines.lock().unwrap().get(machine_id).cloned()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.availability.set_unavailable(down);
    }
}

#[async_trait]
impl MachineRepository for MockMachineRepository {
    async fn get(&self, machine_id: &str) -> SchedulerResult<Option<Machine>> {
        self.availability.check()?;
        Ok(self.snapshot(machine_id))
    }

    async fn register(&self, machine: &Machine) -> SchedulerResult<Machine> {
        self.availability.check()?;
        let mut machines = self.machines.lock().unwrap();
        let stored = machines
            .entry(machine.machine_id.clone())
            .and_modify(|existing| {
                existing.hostname = machine.hostname.clone();
                existing.last_seen = machine.last_seen;
                existing.status = machine.status;
                existing.serial = existing.order;
            })
            .or_insert_with(|| machine.clone());
        Ok(stored.clone())
    }

    async fn touch_heartbeat(&self, machine_id: &str, at: DateTime<Utc>) -> SchedulerResult<bool> {
        self.availability.check()?;
        let mut machines = self.machines.lock().unwrap();
        match machines.get_mut(machine_id) {
            Some(machine) => {
                machine.last_seen = at;
                machine.status = MachineStatus::Online;
                machine.serial = machine.order;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_status(&self, machine_id: &str, status: MachineStatus) -> SchedulerResult<()> {
        self.availability.check()?;
        let mut machines = self.machines.lock().unwrap();
        match machines.get_mut(machine_id) {
            Some(machine) => {
                machine.status = status;
                Ok(())
            }
            None => Err(SchedulerError::MachineNotFound {
                id: machine_id.to_string(),
            }),
        }
    }

    async fn list(&self) -> SchedulerResult<Vec<Machine>> {
        self.availability.check()?;
        let mut machines: Vec<Machine> = self.machines.lock().unwrap().values().cloned().collect();
        machines.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.machine_id.cmp(&b.machine_id))
        });
        Ok(machines)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockJobRepository {
    jobs: Arc<Mutex<BTreeMap<String, serde_json::Value>>>,
    availability: Availability,
    list_calls: Arc<AtomicUsize>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<StoredJob>) -> Self {
        let repo = Self::new();
        for job in jobs {
            repo.put(job);
        }
        repo
    }

    pub fn put(&self, job: StoredJob) {
        self.jobs.lock().unwrap().insert(job.job_id, job.document);
    }

    pub fn remove(&self, job_id: &str) {
        self.jobs.lock().unwrap().remove(job_id);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, down: bool) {
        self.availability.set_unavailable(down);
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn list_all(&self) -> SchedulerResult<Vec<StoredJob>> {
        self.availability.check()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .map(|(job_id, document)| StoredJob {
                job_id: job_id.clone(),
                document: document.clone(),
            })
            .collect())
    }

    async fn upsert(&self, job: &StoredJob) -> SchedulerResult<()> {
        self.availability.check()?;
        self.put(job.clone());
        Ok(())
    }
}

/// 认领键只能插入一次，与真实存储的唯一索引一致
#[derive(Debug, Clone, Default)]
pub struct MockJobRunRepository {
    runs: Arc<Mutex<HashMap<JobRunKey, JobRun>>>,
    availability: Availability,
}

impl MockJobRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_runs(&self) -> Vec<JobRun> {
        let mut runs: Vec<JobRun> = self.runs.lock().unwrap().values().cloned().collect();
        runs.sort_by(|a, b| {
            (a.scheduled_for, &a.job_id, &a.claim_scope).cmp(&(
                b.scheduled_for,
                &b.job_id,
                &b.claim_scope,
            ))
        });
        runs
    }

    pub fn runs_for(&self, job_id: &str) -> Vec<JobRun> {
        self.all_runs()
            .into_iter()
            .filter(|run| run.job_id == job_id)
            .collect()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.availability.set_unavailable(down);
    }
}

#[async_trait]
impl JobRunRepository for MockJobRunRepository {
    async fn try_claim(&self, run: &JobRun) -> SchedulerResult<bool> {
        self.availability.check()?;
        let mut runs = self.runs.lock().unwrap();
        let key = run.key();
        if runs.contains_key(&key) {
            return Ok(false);
        }
        runs.insert(key, run.clone());
        Ok(true)
    }

    async fn mark_running(&self, key: &JobRunKey, started_at: DateTime<Utc>) -> SchedulerResult<()> {
        self.availability.check()?;
        if let Some(run) = self.runs.lock().unwrap().get_mut(key) {
            run.status = JobRunStatus::Running;
            run.started_at = Some(started_at);
        }
        Ok(())
    }

    async fn finish(
        &self,
        key: &JobRunKey,
        result: &JobRunResult,
        finished_at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        self.availability.check()?;
        if let Some(run) = self.runs.lock().unwrap().get_mut(key) {
            run.status = result.status;
            run.attempts = result.attempts;
            run.steps = result.steps.clone();
            run.error_detail = result.error_detail.clone();
            run.finished_at = Some(finished_at);
        }
        Ok(())
    }

    async fn get(&self, key: &JobRunKey) -> SchedulerResult<Option<JobRun>> {
        self.availability.check()?;
        Ok(self.runs.lock().unwrap().get(key).cloned())
    }

    async fn list_for_tick(&self, scheduled_for: DateTime<Utc>) -> SchedulerResult<Vec<JobRun>> {
        self.availability.check()?;
        Ok(self
            .all_runs()
            .into_iter()
            .filter(|run| run.scheduled_for == scheduled_for)
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockCommandRepository {
    commands: Arc<Mutex<Vec<Command>>>,
    availability: Availability,
}

impl MockCommandRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: Command) {
        self.commands.lock().unwrap().push(command);
    }

    pub fn consumed_by(&self, command_id: Uuid) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == command_id)
            .map(|c| c.consumed_by.clone())
            .unwrap_or_default()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.availability.set_unavailable(down);
    }
}

#[async_trait]
impl CommandRepository for MockCommandRepository {
    async fn insert(&self, command: &Command) -> SchedulerResult<()> {
        self.availability.check()?;
        self.push(command.clone());
        Ok(())
    }

    async fn list_pending_for(&self, machine_id: &str) -> SchedulerResult<Vec<Command>> {
        self.availability.check()?;
        let mut pending: Vec<Command> = self
            .commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.is_pending_for(machine_id))
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.issued_at);
        Ok(pending)
    }

    async fn mark_consumed(&self, command_id: Uuid, machine_id: &str) -> SchedulerResult<()> {
        self.availability.check()?;
        let mut commands = self.commands.lock().unwrap();
        if let Some(command) = commands.iter_mut().find(|c| c.id == command_id) {
            if !command.is_consumed_by(machine_id) {
                command.consumed_by.push(machine_id.to_string());
            }
        }
        Ok(())
    }
}

/// 执行器的一次调用记录
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub job_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub local_hour: u32,
    pub at: tokio::time::Instant,
}

/// 只记录调用、按预设返回结果的执行器
#[derive(Debug, Clone)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<ExecutionRecord>>>,
    status: Arc<Mutex<JobRunStatus>>,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(Mutex::new(JobRunStatus::Success)),
        }
    }
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let executor = Self::default();
        *executor.status.lock().unwrap() = JobRunStatus::Error;
        executor
    }

    pub fn calls(&self) -> Vec<ExecutionRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.job_id).collect()
    }
}

#[async_trait]
impl JobExecutor for RecordingExecutor {
    async fn run(&self, job: &JobDefinition, tick: &Tick) -> JobRunResult {
        self.calls.lock().unwrap().push(ExecutionRecord {
            job_id: job.job_id.clone(),
            scheduled_for: tick.scheduled_for,
            local_hour: tick.hour(),
            at: tokio::time::Instant::now(),
        });
        let status = *self.status.lock().unwrap();
        JobRunResult {
            status,
            attempts: 1,
            steps: Vec::new(),
            error_detail: (status == JobRunStatus::Error).then(|| "模拟失败".to_string()),
        }
    }
}

/// 返回预设设置的加载器
#[derive(Debug, Clone)]
pub struct MockSettingsLoader {
    next: Arc<Mutex<Option<RuntimeSettings>>>,
    calls: Arc<AtomicUsize>,
}

impl MockSettingsLoader {
    /// `None` 表示加载失败
    pub fn new(next: Option<RuntimeSettings>) -> Self {
        Self {
            next: Arc::new(Mutex::new(next)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsLoader for MockSettingsLoader {
    async fn load(&self) -> SchedulerResult<RuntimeSettings> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.next
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SchedulerError::Configuration("模拟的配置错误".to_string()))
    }
}

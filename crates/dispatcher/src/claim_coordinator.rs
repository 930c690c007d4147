use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleetcron_core::{
    ClaimOutcome, ExecutionMode, JobDefinition, JobExecutor, JobRun, JobRunKey, JobRunRepository,
    JobRunResult, JobRunStatus, LiveMachine, Tick,
};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::machine_registry::rank_of;

/// 认领协调器配置
#[derive(Debug, Clone)]
pub struct ClaimCoordinatorConfig {
    /// 排名每落后一位多等待的时长
    pub stagger_offset: Duration,
    /// 单个时刻内同时执行的任务数上限
    pub max_concurrent_jobs: usize,
    /// 写入执行结果失败时的重试次数
    pub finish_retries: u32,
    pub finish_retry_delay: Duration,
}

impl Default for ClaimCoordinatorConfig {
    fn default() -> Self {
        Self {
            stagger_offset: Duration::from_secs(5),
            max_concurrent_jobs: 8,
            finish_retries: 3,
            finish_retry_delay: Duration::from_secs(1),
        }
    }
}

/// 单个任务在某一时刻的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTickOutcome {
    /// 认领成功并已执行
    Executed(JobRunStatus),
    /// 其他机器已认领
    ClaimLost,
    /// 本机不在存活列表中，不参与认领
    NotEligible,
    /// 认领时存储不可达，本时刻放弃
    StoreUnavailable(String),
}

/// 认领协调器：按排名错开等待，然后争抢唯一的执行记录
pub struct ClaimCoordinator {
    machine_id: String,
    job_run_repo: Arc<dyn JobRunRepository>,
    executor: Arc<dyn JobExecutor>,
    config: ClaimCoordinatorConfig,
}

impl ClaimCoordinator {
    pub fn new(
        machine_id: impl Into<String>,
        job_run_repo: Arc<dyn JobRunRepository>,
        executor: Arc<dyn JobExecutor>,
        config: ClaimCoordinatorConfig,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            job_run_repo,
            executor,
            config,
        }
    }

    /// 排名为 `rank` 的机器在认领前的等待时长
    pub fn stagger_delay(&self, rank: usize) -> Duration {
        self.config.stagger_offset * rank.saturating_sub(1) as u32
    }

    /// 处理一个时刻的到期任务
    ///
    /// 全机器任务立即以本机为范围认领执行；仅领导者任务统一等待一次错开时长后
    /// 以全舰队为范围认领。本机不在 `live` 中时什么都不做。
    pub async fn process_tick(
        &self,
        tick: &Tick,
        due: Vec<JobDefinition>,
        live: &[LiveMachine],
    ) -> Vec<(String, JobTickOutcome)> {
        let Some(rank) = rank_of(live, &self.machine_id) else {
            warn!(
                machine_id = %self.machine_id,
                "本机不在存活列表中，跳过时刻 {}",
                tick.scheduled_for
            );
            return due
                .into_iter()
                .map(|job| (job.job_id, JobTickOutcome::NotEligible))
                .collect();
        };

        let (leader_only, all_machines): (Vec<_>, Vec<_>) = due
            .into_iter()
            .partition(|job| job.execution_mode == ExecutionMode::LeaderOnly);

        let per_machine = async {
            let keyed = all_machines
                .into_iter()
                .map(|job| {
                    let key = JobRunKey::per_machine(&job.job_id, tick.scheduled_for, &self.machine_id);
                    (job, key)
                })
                .collect();
            self.run_group(tick, keyed).await
        };

        let fleet = async {
            if leader_only.is_empty() {
                return Vec::new();
            }
            let delay = self.stagger_delay(rank);
            if !delay.is_zero() {
                debug!(
                    "排名 {rank}，等待 {}ms 后认领 {} 个任务",
                    delay.as_millis(),
                    leader_only.len()
                );
                tokio::time::sleep(delay).await;
            }
            let keyed = leader_only
                .into_iter()
                .map(|job| {
                    let key = JobRunKey::fleet(&job.job_id, tick.scheduled_for);
                    (job, key)
                })
                .collect();
            self.run_group(tick, keyed).await
        };

        let (mut outcomes, fleet_outcomes) = tokio::join!(per_machine, fleet);
        outcomes.extend(fleet_outcomes);
        outcomes
    }

    async fn run_group(
        &self,
        tick: &Tick,
        jobs: Vec<(JobDefinition, JobRunKey)>,
    ) -> Vec<(String, JobTickOutcome)> {
        stream::iter(jobs)
            .map(|(job, key)| async move {
                let outcome = self.claim_and_run(tick, &job, key).await;
                (job.job_id, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_jobs.max(1))
            .collect()
            .await
    }

    /// 认领并执行单个任务
    pub async fn claim_and_run(&self, tick: &Tick, job: &JobDefinition, key: JobRunKey) -> JobTickOutcome {
        let run = JobRun::pending(&key, &self.machine_id);
        let claim = match self.job_run_repo.try_claim(&run).await {
            Ok(true) => ClaimOutcome::Won,
            Ok(false) => ClaimOutcome::Lost,
            Err(e) => {
                error!("认领任务 {key} 时存储不可达: {e}");
                return JobTickOutcome::StoreUnavailable(e.to_string());
            }
        };
        metrics::counter!("fleetcron_claims_total", "outcome" => claim.as_str()).increment(1);

        if claim == ClaimOutcome::Lost {
            info!("任务 {key} 已被其他机器认领");
            return JobTickOutcome::ClaimLost;
        }

        info!(machine_id = %self.machine_id, "认领成功，开始执行 {key}");
        if let Err(e) = self.job_run_repo.mark_running(&key, Utc::now()).await {
            warn!("更新任务 {key} 为运行中失败: {e}");
        }

        let result = self.executor.run(job, tick).await;
        metrics::counter!("fleetcron_job_runs_total", "status" => result.status.as_str()).increment(1);
        match result.status {
            JobRunStatus::Success => info!("任务 {key} 执行成功，尝试次数 {}", result.attempts),
            _ => warn!(
                "任务 {key} 执行失败: {}",
                result.error_detail.as_deref().unwrap_or("未知错误")
            ),
        }

        self.record_result(&key, &result).await;
        JobTickOutcome::Executed(result.status)
    }

    /// 写入执行结果，失败时有限次重试，最终失败只记录日志
    async fn record_result(&self, key: &JobRunKey, result: &JobRunResult) {
        let mut attempt = 0;
        loop {
            match self.job_run_repo.finish(key, result, Utc::now()).await {
                Ok(()) => return,
                Err(e) if attempt < self.config.finish_retries => {
                    attempt += 1;
                    warn!("写入任务 {key} 结果失败（第 {attempt} 次）: {e}");
                    tokio::time::sleep(self.config.finish_retry_delay).await;
                }
                Err(e) => {
                    error!(
                        "任务 {key} 结果最终未能写入: status={}, detail={:?}, error={e}",
                        result.status, result.error_detail
                    );
                    return;
                }
            }
        }
    }
}

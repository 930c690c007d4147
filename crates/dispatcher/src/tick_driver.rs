use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use fleetcron_core::{SharedSettings, Tick};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::claim_coordinator::{ClaimCoordinator, JobTickOutcome};
use crate::job_catalog::JobCatalog;
use crate::machine_registry::MachineRegistry;

/// 时刻驱动配置
#[derive(Debug, Clone)]
pub struct TickDriverConfig {
    /// 每个时刻开始前从存储重新加载任务目录
    pub reload_catalog_each_tick: bool,
    /// 关闭时等待进行中时刻完成的最长时间
    pub shutdown_grace: Duration,
}

impl Default for TickDriverConfig {
    fn default() -> Self {
        Self {
            reload_catalog_each_tick: true,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// 一个时刻的处理报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub scheduled_for: DateTime<Utc>,
    pub outcomes: Vec<(String, JobTickOutcome)>,
    /// 存储不可达导致整个时刻被放弃时的原因
    pub abandoned: Option<String>,
}

impl TickReport {
    fn abandoned(scheduled_for: DateTime<Utc>, reason: String) -> Self {
        Self {
            scheduled_for,
            outcomes: Vec::new(),
            abandoned: Some(reason),
        }
    }

    pub fn executed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, JobTickOutcome::Executed(_)))
            .count()
    }
}

/// 下一个要处理的整分钟时刻
///
/// 取 `now` 之后最近的整分钟；若墙钟落后于上一个已处理的时刻，则顺延到其后一分钟，
/// 同一分钟不会被处理两次。
pub fn next_tick_after(now: DateTime<Utc>, last_tick: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let next = Tick::at(now, chrono_tz::UTC).scheduled_for + TimeDelta::minutes(1);
    match last_tick {
        Some(last) if next <= last => last + TimeDelta::minutes(1),
        _ => next,
    }
}

/// 时刻驱动：在每个整分钟触发一次 心跳 → 目录 → 存活列表 → 认领执行
pub struct TickDriver {
    registry: Arc<MachineRegistry>,
    catalog: Arc<JobCatalog>,
    coordinator: Arc<ClaimCoordinator>,
    settings: SharedSettings,
    config: TickDriverConfig,
}

impl TickDriver {
    pub fn new(
        registry: Arc<MachineRegistry>,
        catalog: Arc<JobCatalog>,
        coordinator: Arc<ClaimCoordinator>,
        settings: SharedSettings,
        config: TickDriverConfig,
    ) -> Self {
        Self {
            registry,
            catalog,
            coordinator,
            settings,
            config,
        }
    }

    /// 处理 `now` 所在的分钟
    ///
    /// 心跳、目录加载或存活列表读取失败时放弃本时刻，不做任何认领。
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let settings = self.settings.current().await;
        let tick = Tick::at(now, settings.timezone);
        debug!("处理时刻 {} (本地 {})", tick.scheduled_for, tick.local);

        if let Err(e) = self.registry.refresh_heartbeat(now).await {
            error!("心跳失败，放弃时刻 {}: {e}", tick.scheduled_for);
            return TickReport::abandoned(tick.scheduled_for, e.to_string());
        }

        let snapshot = if self.config.reload_catalog_each_tick {
            match self.catalog.load_jobs().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!("加载任务目录失败，放弃时刻 {}: {e}", tick.scheduled_for);
                    return TickReport::abandoned(tick.scheduled_for, e.to_string());
                }
            }
        } else {
            self.catalog.snapshot().await
        };

        let due = snapshot.due_at(&tick);
        if due.is_empty() {
            return TickReport {
                scheduled_for: tick.scheduled_for,
                outcomes: Vec::new(),
                abandoned: None,
            };
        }

        let live = match self.registry.list_live_machines(now).await {
            Ok(live) => live,
            Err(e) => {
                error!("读取存活机器失败，放弃时刻 {}: {e}", tick.scheduled_for);
                return TickReport::abandoned(tick.scheduled_for, e.to_string());
            }
        };

        let outcomes = self.coordinator.process_tick(&tick, due, &live).await;
        let report = TickReport {
            scheduled_for: tick.scheduled_for,
            outcomes,
            abandoned: None,
        };
        info!(
            "时刻 {} 处理完成: 到期 {}，本机执行 {}",
            report.scheduled_for,
            report.outcomes.len(),
            report.executed()
        );
        report
    }

    /// 对齐整分钟循环运行，直到收到关闭信号
    ///
    /// 每个时刻在独立任务中处理，慢任务不会推迟下一个时刻。
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut in_flight = JoinSet::new();
        let mut last_tick: Option<DateTime<Utc>> = None;

        info!(machine_id = %self.registry.machine_id(), "时刻驱动已启动");
        loop {
            let now = Utc::now();
            let target = next_tick_after(now, last_tick);
            let wait = (target - now).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    last_tick = Some(target);
                    let driver = Arc::clone(&self);
                    in_flight.spawn(async move { driver.run_tick(target).await });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("时刻处理任务异常退出: {e}");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("时刻驱动收到关闭信号");
                    break;
                }
            }
        }

        if in_flight.is_empty() {
            return;
        }
        info!("等待 {} 个进行中的时刻完成", in_flight.len());
        let drain = async { while in_flight.join_next().await.is_some() {} };
        if tokio::time::timeout(self.config.shutdown_grace, drain).await.is_err() {
            warn!(
                "{}秒内未完成，放弃剩余的时刻处理",
                self.config.shutdown_grace.as_secs()
            );
            in_flight.abort_all();
        }
    }
}

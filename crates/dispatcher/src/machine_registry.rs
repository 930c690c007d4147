use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fleetcron_core::{
    LiveMachine, Machine, MachineRepository, MachineStatus, SchedulerResult,
};
use tracing::{debug, error, info, warn};

/// 机器注册表配置
#[derive(Debug, Clone)]
pub struct MachineRegistryConfig {
    /// 超过该时长未刷新心跳的机器视为不存活
    pub staleness_threshold: Duration,
    /// 新机器自动分配顺序号的上限
    pub max_order: i32,
}

impl Default for MachineRegistryConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: Duration::seconds(120),
            max_order: 10,
        }
    }
}

/// 存活机器按 (order, machine_id) 排序后，`machine_id` 的1起始排名
pub fn rank_of(live: &[LiveMachine], machine_id: &str) -> Option<usize> {
    live.iter()
        .position(|m| m.machine_id == machine_id)
        .map(|index| index + 1)
}

/// `1..=max_order` 中未被存活机器占用的最小顺序号；都被占用时取最大值加一
pub fn next_free_order(live: &[LiveMachine], max_order: i32) -> i32 {
    (1..=max_order)
        .find(|order| !live.iter().any(|m| m.order == *order))
        .unwrap_or_else(|| live.iter().map(|m| m.order).max().unwrap_or(0).max(max_order) + 1)
}

/// 机器注册表：维护本机心跳，并发现其他机器的存活状态
pub struct MachineRegistry {
    machine_repo: Arc<dyn MachineRepository>,
    machine_id: String,
    hostname: String,
    config: MachineRegistryConfig,
}

impl MachineRegistry {
    pub fn new(
        machine_repo: Arc<dyn MachineRepository>,
        machine_id: impl Into<String>,
        hostname: impl Into<String>,
        config: MachineRegistryConfig,
    ) -> Self {
        Self {
            machine_repo,
            machine_id: machine_id.into(),
            hostname: hostname.into(),
            config,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn config(&self) -> &MachineRegistryConfig {
        &self.config
    }

    /// 启动时注册本机
    ///
    /// 已有记录时保留运维设置的顺序号，只刷新主机名和心跳；
    /// 没有记录时分配一个空闲顺序号。
    pub async fn register(&self, now: DateTime<Utc>) -> SchedulerResult<Machine> {
        let order = match self.machine_repo.get(&self.machine_id).await? {
            Some(existing) => existing.order,
            None => {
                let live = self.list_live_machines(now).await?;
                let order = next_free_order(&live, self.config.max_order);
                if order > self.config.max_order {
                    warn!(
                        "1~{} 的顺序号均已被占用，分配顺序号 {order}",
                        self.config.max_order
                    );
                }
                order
            }
        };

        let mut machine = Machine::new(&self.machine_id, &self.hostname, order);
        machine.last_seen = now;
        machine.registered_at = now;

        let stored = self.machine_repo.register(&machine).await?;
        info!(
            machine_id = %stored.machine_id,
            "机器已注册: hostname={}, order={}",
            stored.hostname,
            stored.order
        );
        Ok(stored)
    }

    /// 刷新本机心跳，每个调度时刻一次
    ///
    /// 记录被外部删除时重新注册。
    pub async fn refresh_heartbeat(&self, now: DateTime<Utc>) -> SchedulerResult<()> {
        let touched = match self.machine_repo.touch_heartbeat(&self.machine_id, now).await {
            Ok(touched) => touched,
            Err(e) => {
                metrics::counter!("fleetcron_heartbeat_failures_total").increment(1);
                error!(machine_id = %self.machine_id, "刷新心跳失败: {e}");
                return Err(e);
            }
        };

        if !touched {
            warn!(machine_id = %self.machine_id, "机器记录不存在，重新注册");
            self.register(now).await?;
        } else {
            debug!(machine_id = %self.machine_id, "心跳已刷新");
        }
        Ok(())
    }

    /// 列出 `now` 时刻存活的机器，按 (order, machine_id) 升序
    ///
    /// 过期的记录只是被过滤掉，从不删除。
    pub async fn list_live_machines(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<LiveMachine>> {
        let machines = self.machine_repo.list().await?;
        let mut live: Vec<LiveMachine> = machines
            .iter()
            .filter(|m| m.is_live_at(now, self.config.staleness_threshold))
            .map(LiveMachine::from)
            .collect();
        live.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.machine_id.cmp(&b.machine_id))
        });
        Ok(live)
    }

    /// 优雅关闭时标记下线，其他机器在下一时刻即不再把本机计入排名
    pub async fn mark_offline(&self) -> SchedulerResult<()> {
        self.machine_repo
            .set_status(&self.machine_id, MachineStatus::Offline)
            .await?;
        info!(machine_id = %self.machine_id, "机器已标记为下线");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcron_testing_utils::{machine_seen, MockMachineRepository};

    fn live(entries: &[(&str, i32)]) -> Vec<LiveMachine> {
        entries
            .iter()
            .map(|(id, order)| LiveMachine {
                machine_id: id.to_string(),
                order: *order,
            })
            .collect()
    }

    #[test]
    fn rank_is_one_based_position() {
        let machines = live(&[("a", 1), ("b", 2), ("c", 5)]);
        assert_eq!(rank_of(&machines, "a"), Some(1));
        assert_eq!(rank_of(&machines, "c"), Some(3));
        assert_eq!(rank_of(&machines, "z"), None);
    }

    #[test]
    fn free_order_fills_lowest_gap() {
        assert_eq!(next_free_order(&live(&[]), 10), 1);
        assert_eq!(next_free_order(&live(&[("a", 1), ("b", 3)]), 10), 2);
        assert_eq!(next_free_order(&live(&[("a", 1), ("b", 2)]), 2), 3);
        assert_eq!(next_free_order(&live(&[("a", 1), ("b", 7)]), 2), 8);
    }

    fn registry(repo: &MockMachineRepository, id: &str) -> MachineRegistry {
        MachineRegistry::new(
            Arc::new(repo.clone()),
            id,
            "host",
            MachineRegistryConfig::default(),
        )
    }

    #[tokio::test]
    async fn live_machines_exclude_stale_and_break_ties_by_id() {
        let now = Utc::now();
        let repo = MockMachineRepository::with_machines(vec![
            machine_seen("b", 1, now, 10),
            machine_seen("a", 1, now, 30),
            machine_seen("c", 0, now, 121),
            machine_seen("d", 2, now, 120),
        ]);
        let live = registry(&repo, "a").list_live_machines(now).await.unwrap();
        let ids: Vec<&str> = live.iter().map(|m| m.machine_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);

        // 过期记录不会被删除
        assert!(repo.snapshot("c").is_some());
    }

    #[tokio::test]
    async fn offline_machines_are_not_live() {
        let now = Utc::now();
        let mut gone = machine_seen("a", 1, now, 1);
        gone.status = MachineStatus::Offline;
        let repo = MockMachineRepository::with_machines(vec![gone, machine_seen("b", 2, now, 1)]);
        let live = registry(&repo, "b").list_live_machines(now).await.unwrap();
        assert_eq!(rank_of(&live, "b"), Some(1));
    }

    #[tokio::test]
    async fn register_assigns_free_order_to_new_machine() {
        let now = Utc::now();
        let repo = MockMachineRepository::with_machines(vec![
            machine_seen("a", 1, now, 5),
            machine_seen("b", 2, now, 500),
        ]);
        let stored = registry(&repo, "new").register(now).await.unwrap();
        assert_eq!(stored.order, 2);
        assert_eq!(stored.serial, 2);
    }

    #[tokio::test]
    async fn register_keeps_existing_order() {
        let now = Utc::now();
        let repo = MockMachineRepository::with_machines(vec![machine_seen("a", 7, now, 500)]);
        let stored = registry(&repo, "a").register(now).await.unwrap();
        assert_eq!(stored.order, 7);
        assert_eq!(stored.last_seen, now);
    }

    #[tokio::test]
    async fn heartbeat_picks_up_operator_order_change() {
        let now = Utc::now();
        let repo = MockMachineRepository::with_machines(vec![machine_seen("a", 1, now, 30)]);
        let registry = registry(&repo, "a");

        repo.set_order("a", 4);
        registry.refresh_heartbeat(now).await.unwrap();

        let machine = repo.snapshot("a").unwrap();
        assert_eq!(machine.last_seen, now);
        assert_eq!(machine.serial, 4);
        let live = registry.list_live_machines(now).await.unwrap();
        assert_eq!(live[0].order, 4);
    }

    #[tokio::test]
    async fn heartbeat_reregisters_missing_record() {
        let now = Utc::now();
        let repo = MockMachineRepository::new();
        registry(&repo, "a").refresh_heartbeat(now).await.unwrap();
        assert_eq!(repo.snapshot("a").unwrap().order, 1);
    }

    #[tokio::test]
    async fn heartbeat_failure_is_reported() {
        let repo = MockMachineRepository::new();
        repo.set_unavailable(true);
        let err = registry(&repo, "a")
            .refresh_heartbeat(Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_store_unavailable());
    }

    #[tokio::test]
    async fn mark_offline_sets_status() {
        let now = Utc::now();
        let repo = MockMachineRepository::with_machines(vec![machine_seen("a", 1, now, 0)]);
        registry(&repo, "a").mark_offline().await.unwrap();
        assert_eq!(repo.snapshot("a").unwrap().status, MachineStatus::Offline);
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleetcron_core::{
    Command, CommandRepository, CommandTarget, CommandType, SchedulerResult, SettingsLoader,
    SharedSettings,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::job_catalog::JobCatalog;

/// 命令通道配置
#[derive(Debug, Clone)]
pub struct CommandChannelConfig {
    /// 轮询间隔
    pub poll_interval: Duration,
    /// 超过该时长的命令直接标记为已消费而不执行
    pub max_age: chrono::Duration,
}

impl Default for CommandChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_age: chrono::Duration::hours(24),
        }
    }
}

/// 写入一条新命令
pub async fn send_command(
    command_repo: &dyn CommandRepository,
    command_type: CommandType,
    target: CommandTarget,
) -> SchedulerResult<Command> {
    let command = Command::new(command_type, target);
    command_repo.insert(&command).await?;
    info!("命令已发出: id={}, type={}, target={}", command.id, command.command_type, command.target);
    Ok(command)
}

/// 命令通道：轮询针对本机的未消费命令并执行
pub struct CommandChannel {
    machine_id: String,
    command_repo: Arc<dyn CommandRepository>,
    catalog: Arc<JobCatalog>,
    settings: SharedSettings,
    settings_loader: Arc<dyn SettingsLoader>,
    config: CommandChannelConfig,
}

impl CommandChannel {
    pub fn new(
        machine_id: impl Into<String>,
        command_repo: Arc<dyn CommandRepository>,
        catalog: Arc<JobCatalog>,
        settings: SharedSettings,
        settings_loader: Arc<dyn SettingsLoader>,
        config: CommandChannelConfig,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            command_repo,
            catalog,
            settings,
            settings_loader,
            config,
        }
    }

    /// 针对本机、本机尚未消费的命令
    pub async fn poll_commands(&self) -> SchedulerResult<Vec<Command>> {
        let mut pending = self.command_repo.list_pending_for(&self.machine_id).await?;
        pending.retain(|c| c.is_pending_for(&self.machine_id));
        Ok(pending)
    }

    /// 执行一种命令
    ///
    /// reload-config 先整体替换运行时设置，再重新加载任务目录。
    pub async fn apply(&self, command_type: CommandType) -> SchedulerResult<()> {
        match command_type {
            CommandType::ReloadJobs => {
                self.catalog.load_jobs().await?;
            }
            CommandType::ReloadConfig => {
                // 任务目录重新加载成功后才切换配置，失败时保持旧配置
                let settings = self.settings_loader.load().await?;
                self.catalog.load_jobs().await?;
                info!("运行时配置已重新加载: timezone={}", settings.timezone);
                self.settings.replace(settings).await;
            }
        }
        Ok(())
    }

    pub async fn mark_consumed(&self, command: &Command) -> SchedulerResult<()> {
        self.command_repo
            .mark_consumed(command.id, &self.machine_id)
            .await
    }

    /// 完整处理一轮，返回本轮被消费的命令数
    ///
    /// 同一轮内同类命令只执行一次；执行失败的命令保持未消费，下一轮重试。
    pub async fn poll_once(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let pending = self.poll_commands().await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let (expired, fresh): (Vec<Command>, Vec<Command>) = pending
            .into_iter()
            .partition(|c| now - c.issued_at > self.config.max_age);

        let mut consumed = 0;
        for command in &expired {
            info!("命令已过期，不再执行: id={}, issued_at={}", command.id, command.issued_at);
            self.mark_consumed(command).await?;
            consumed += 1;
        }

        let wants_config = fresh
            .iter()
            .any(|c| c.command_type == CommandType::ReloadConfig);
        let wants_jobs = fresh
            .iter()
            .any(|c| c.command_type == CommandType::ReloadJobs);

        // reload-config 已包含任务重新加载
        let mut applied: Vec<CommandType> = Vec::new();
        if wants_config {
            match self.apply(CommandType::ReloadConfig).await {
                Ok(()) => applied.extend([CommandType::ReloadConfig, CommandType::ReloadJobs]),
                Err(e) => error!("执行 reload-config 失败，稍后重试: {e}"),
            }
        }
        if wants_jobs && !applied.contains(&CommandType::ReloadJobs) {
            match self.apply(CommandType::ReloadJobs).await {
                Ok(()) => applied.push(CommandType::ReloadJobs),
                Err(e) => error!("执行 reload-jobs 失败，稍后重试: {e}"),
            }
        }

        for command in fresh.iter().filter(|c| applied.contains(&c.command_type)) {
            self.mark_consumed(command).await?;
            debug!("命令已消费: id={}, type={}", command.id, command.command_type);
            consumed += 1;
        }
        Ok(consumed)
    }

    /// 按固定间隔轮询，直到收到关闭信号
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.poll_once(Utc::now()).await {
                        Ok(0) => {}
                        Ok(n) => info!("本轮消费了 {n} 条命令"),
                        Err(e) => warn!("轮询命令失败: {e}"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("命令通道收到关闭信号");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcron_core::RuntimeSettings;
    use fleetcron_testing_utils::{
        JobDefinitionBuilder, MockCommandRepository, MockJobRepository, MockSettingsLoader,
    };

    struct Fixture {
        commands: MockCommandRepository,
        jobs: MockJobRepository,
        loader: MockSettingsLoader,
        settings: SharedSettings,
    }

    impl Fixture {
        fn new(next_settings: Option<RuntimeSettings>) -> Self {
            Self {
                commands: MockCommandRepository::new(),
                jobs: MockJobRepository::with_jobs(vec![JobDefinitionBuilder::new("a").at(1, 0).stored()]),
                loader: MockSettingsLoader::new(next_settings),
                settings: SharedSettings::new(RuntimeSettings::default()),
            }
        }

        fn channel(&self, machine_id: &str) -> CommandChannel {
            CommandChannel::new(
                machine_id,
                Arc::new(self.commands.clone()),
                Arc::new(JobCatalog::new(Arc::new(self.jobs.clone()))),
                self.settings.clone(),
                Arc::new(self.loader.clone()),
                CommandChannelConfig::default(),
            )
        }
    }

    #[tokio::test]
    async fn broadcast_command_is_consumed_once_per_machine() {
        let fx = Fixture::new(None);
        let command = send_command(&fx.commands, CommandType::ReloadJobs, CommandTarget::All)
            .await
            .unwrap();

        let a = fx.channel("a");
        let b = fx.channel("b");
        assert_eq!(a.poll_once(Utc::now()).await.unwrap(), 1);
        assert_eq!(a.poll_once(Utc::now()).await.unwrap(), 0);
        assert_eq!(b.poll_once(Utc::now()).await.unwrap(), 1);

        assert_eq!(fx.commands.consumed_by(command.id), vec!["a", "b"]);
        assert_eq!(fx.jobs.list_calls(), 2);
    }

    #[tokio::test]
    async fn targeted_command_is_ignored_by_others() {
        let fx = Fixture::new(None);
        let command = send_command(
            &fx.commands,
            CommandType::ReloadJobs,
            CommandTarget::Machine("b".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(fx.channel("a").poll_once(Utc::now()).await.unwrap(), 0);
        assert!(fx.commands.consumed_by(command.id).is_empty());
        assert_eq!(fx.jobs.list_calls(), 0);

        assert_eq!(fx.channel("b").poll_once(Utc::now()).await.unwrap(), 1);
        assert_eq!(fx.commands.consumed_by(command.id), vec!["b"]);
    }

    #[tokio::test]
    async fn duplicate_commands_are_coalesced() {
        let fx = Fixture::new(None);
        for _ in 0..3 {
            send_command(&fx.commands, CommandType::ReloadJobs, CommandTarget::All)
                .await
                .unwrap();
        }
        assert_eq!(fx.channel("a").poll_once(Utc::now()).await.unwrap(), 3);
        assert_eq!(fx.jobs.list_calls(), 1);
    }

    #[tokio::test]
    async fn expired_command_is_consumed_without_applying() {
        let fx = Fixture::new(None);
        let mut command = Command::new(CommandType::ReloadJobs, CommandTarget::All);
        command.issued_at = Utc::now() - chrono::Duration::hours(25);
        fx.commands.push(command.clone());

        assert_eq!(fx.channel("a").poll_once(Utc::now()).await.unwrap(), 1);
        assert_eq!(fx.commands.consumed_by(command.id), vec!["a"]);
        assert_eq!(fx.jobs.list_calls(), 0);
    }

    #[tokio::test]
    async fn reload_config_swaps_settings_then_reloads_jobs() {
        let next = RuntimeSettings {
            timezone: chrono_tz::UTC,
            ..RuntimeSettings::default()
        };
        let fx = Fixture::new(Some(next));
        send_command(&fx.commands, CommandType::ReloadConfig, CommandTarget::All)
            .await
            .unwrap();
        send_command(&fx.commands, CommandType::ReloadJobs, CommandTarget::All)
            .await
            .unwrap();

        assert_eq!(fx.channel("a").poll_once(Utc::now()).await.unwrap(), 2);
        assert_eq!(fx.settings.current().await.timezone, chrono_tz::UTC);
        assert_eq!(fx.loader.calls(), 1);
        assert_eq!(fx.jobs.list_calls(), 1);
    }

    #[tokio::test]
    async fn failed_apply_leaves_command_pending() {
        let fx = Fixture::new(None);
        let command = send_command(&fx.commands, CommandType::ReloadConfig, CommandTarget::All)
            .await
            .unwrap();

        let a = fx.channel("a");
        assert_eq!(a.poll_once(Utc::now()).await.unwrap(), 0);
        assert!(fx.commands.consumed_by(command.id).is_empty());
        assert_eq!(fx.settings.current().await.timezone, chrono_tz::Asia::Seoul);

        // 下一轮仍会重试
        assert_eq!(a.poll_once(Utc::now()).await.unwrap(), 0);
        assert_eq!(fx.loader.calls(), 2);
    }

    #[tokio::test]
    async fn reload_config_keeps_old_settings_when_catalog_reload_fails() {
        let mut next = RuntimeSettings::default();
        next.timezone = chrono_tz::UTC;
        let fx = Fixture::new(Some(next));
        fx.jobs.set_unavailable(true);
        let command = send_command(&fx.commands, CommandType::ReloadConfig, CommandTarget::All)
            .await
            .unwrap();

        let a = fx.channel("a");
        assert_eq!(a.poll_once(Utc::now()).await.unwrap(), 0);
        assert_eq!(fx.loader.calls(), 1);
        assert_eq!(fx.settings.current().await.timezone, chrono_tz::Asia::Seoul);
        assert!(fx.commands.consumed_by(command.id).is_empty());

        // 存储恢复后整条命令一次生效
        fx.jobs.set_unavailable(false);
        assert_eq!(a.poll_once(Utc::now()).await.unwrap(), 1);
        assert_eq!(fx.settings.current().await.timezone, chrono_tz::UTC);
        assert_eq!(fx.commands.consumed_by(command.id), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let fx = Fixture::new(None);
        fx.commands.set_unavailable(true);
        let err = fx.channel("a").poll_once(Utc::now()).await.unwrap_err();
        assert!(err.is_store_unavailable());
    }
}

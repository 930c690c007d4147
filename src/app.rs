use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use fleetcron_core::{
    AppConfig, Command, CommandTarget, CommandType, FileSettingsLoader, MachineRepository,
    RuntimeSettings, SharedSettings,
};
use fleetcron_dispatcher::{
    send_command, ClaimCoordinator, ClaimCoordinatorConfig, CommandChannel, CommandChannelConfig,
    JobCatalog, MachineRegistry, MachineRegistryConfig, TickDriver, TickDriverConfig,
};
use fleetcron_infrastructure::DatabaseManager;
use fleetcron_worker::ActionChainExecutor;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::identity::{local_hostname, MachineIdentity};

/// 注册表中一台机器的展示行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineRow {
    pub machine_id: String,
    pub hostname: String,
    pub order: i32,
    pub rank: Option<usize>,
    pub status: String,
    pub seconds_since_seen: i64,
}

/// 主应用程序：把共享存储、注册表、目录、协调器和命令通道组装在一起
pub struct Application {
    config: AppConfig,
    identity: MachineIdentity,
    db: Arc<DatabaseManager>,
    registry: Arc<MachineRegistry>,
    catalog: Arc<JobCatalog>,
    driver: Arc<TickDriver>,
    channel: Arc<CommandChannel>,
}

impl Application {
    /// 连接存储、初始化表结构并构建各组件
    pub async fn new(config: AppConfig, config_path: Option<PathBuf>) -> Result<Self> {
        let home_dir = config.agent.resolve_home_dir();
        let identity = MachineIdentity::load_or_create(&home_dir)?;
        info!(
            "初始化应用程序: machine_id={}, 存储={}",
            identity.machine_id,
            mask_database_url(&config.database.url)
        );

        let db = Arc::new(
            DatabaseManager::from_config(&config.database)
                .await
                .context("连接共享存储失败")?,
        );
        db.ensure_schema().await.context("初始化表结构失败")?;

        let runtime = RuntimeSettings::from_config(&config).context("解析运行时配置失败")?;
        let settings = SharedSettings::new(runtime);
        let agent = &config.agent;

        let registry = Arc::new(MachineRegistry::new(
            db.machine_repository(),
            identity.machine_id.clone(),
            local_hostname(),
            MachineRegistryConfig {
                staleness_threshold: chrono::Duration::seconds(agent.staleness_threshold_seconds as i64),
                max_order: agent.max_order,
            },
        ));
        let catalog = Arc::new(JobCatalog::new(db.job_repository()));
        let executor = Arc::new(ActionChainExecutor::new(settings.clone()));
        let coordinator = Arc::new(ClaimCoordinator::new(
            identity.machine_id.clone(),
            db.job_run_repository(),
            executor,
            ClaimCoordinatorConfig {
                stagger_offset: Duration::from_secs(agent.stagger_offset_seconds),
                max_concurrent_jobs: agent.max_concurrent_jobs,
                ..ClaimCoordinatorConfig::default()
            },
        ));
        let driver = Arc::new(TickDriver::new(
            Arc::clone(&registry),
            Arc::clone(&catalog),
            coordinator,
            settings.clone(),
            TickDriverConfig {
                reload_catalog_each_tick: agent.reload_catalog_each_tick,
                shutdown_grace: Duration::from_secs(agent.shutdown_grace_seconds),
            },
        ));
        let channel = Arc::new(CommandChannel::new(
            identity.machine_id.clone(),
            db.command_repository(),
            Arc::clone(&catalog),
            settings,
            Arc::new(FileSettingsLoader::new(config_path)),
            CommandChannelConfig {
                poll_interval: Duration::from_secs(agent.command_poll_interval_seconds),
                max_age: chrono::Duration::seconds(agent.command_max_age_seconds as i64),
            },
        ));

        Ok(Self {
            config,
            identity,
            db,
            registry,
            catalog,
            driver,
            channel,
        })
    }

    pub fn machine_id(&self) -> &str {
        &self.identity.machine_id
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 运行代理直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.registry
            .register(Utc::now())
            .await
            .context("注册本机失败")?;
        if let Err(e) = self.catalog.load_jobs().await {
            warn!("启动时加载任务目录失败，将在下一个时刻重试: {e}");
        }

        let driver_handle = {
            let driver = Arc::clone(&self.driver);
            let shutdown_rx = shutdown_rx.resubscribe();
            tokio::spawn(async move { driver.run(shutdown_rx).await })
        };

        let channel_handle = {
            let channel = Arc::clone(&self.channel);
            let shutdown_rx = shutdown_rx.resubscribe();
            tokio::spawn(async move { channel.run(shutdown_rx).await })
        };

        let _ = shutdown_rx.recv().await;
        info!("代理收到关闭信号");

        let (driver_result, channel_result) = tokio::join!(driver_handle, channel_handle);
        if let Err(e) = driver_result {
            error!("时刻驱动异常退出: {e}");
        }
        if let Err(e) = channel_result {
            error!("命令通道异常退出: {e}");
        }

        if let Err(e) = self.registry.mark_offline().await {
            warn!("标记下线失败，其他机器将在存活窗口过后忽略本机: {e}");
        }
        self.db.close().await;
        info!("代理已停止");
        Ok(())
    }

    /// 向舰队发出一条命令
    pub async fn send(&self, command_type: CommandType, target: CommandTarget) -> Result<Command> {
        let repo = self.db.command_repository();
        let command = send_command(repo.as_ref(), command_type, target)
            .await
            .context("写入命令失败")?;
        Ok(command)
    }

    /// 注册表中的所有机器及其当前存活排名
    pub async fn machines(&self) -> Result<Vec<MachineRow>> {
        let now = Utc::now();
        let machines = self
            .db
            .machine_repository()
            .list()
            .await
            .context("读取机器列表失败")?;
        let live = self.registry.list_live_machines(now).await?;

        Ok(machines
            .into_iter()
            .map(|m| MachineRow {
                rank: fleetcron_dispatcher::rank_of(&live, &m.machine_id),
                seconds_since_seen: (now - m.last_seen).num_seconds(),
                status: m.status.to_string(),
                machine_id: m.machine_id,
                hostname: m.hostname,
                order: m.order,
            })
            .collect())
    }
}

/// 屏蔽数据库URL中的敏感信息
fn mask_database_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_credentials_are_masked() {
        assert_eq!(
            mask_database_url("postgres://user:pw@db:5432/fleet"),
            "postgres://***@db:5432/fleet"
        );
        assert_eq!(mask_database_url("sqlite::memory:"), "sqlite::memory:");
    }
}

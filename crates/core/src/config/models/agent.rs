use std::path::PathBuf;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// 代理运行参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// IANA 时区名，调度和 `when` 条件都按该时区求值
    pub timezone: String,
    pub staleness_threshold_seconds: u64,
    pub stagger_offset_seconds: u64,
    pub max_order: i32,
    pub command_poll_interval_seconds: u64,
    pub command_max_age_seconds: u64,
    pub max_concurrent_jobs: usize,
    pub reload_catalog_each_tick: bool,
    pub shutdown_grace_seconds: u64,
    pub home_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Seoul".to_string(),
            staleness_threshold_seconds: 120,
            stagger_offset_seconds: 5,
            max_order: 10,
            command_poll_interval_seconds: 10,
            command_max_age_seconds: 86_400,
            max_concurrent_jobs: 8,
            reload_catalog_each_tick: true,
            shutdown_grace_seconds: 30,
            home_dir: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_timezone()?;

        if self.staleness_threshold_seconds == 0 {
            return Err(anyhow::anyhow!("存活判定阈值必须大于0"));
        }

        if self.command_poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("命令轮询间隔必须大于0"));
        }

        if self.command_max_age_seconds == 0 {
            return Err(anyhow::anyhow!("命令最长有效期必须大于0"));
        }

        if self.max_concurrent_jobs == 0 {
            return Err(anyhow::anyhow!("最大并发任务数必须大于0"));
        }

        if self.max_order <= 0 {
            return Err(anyhow::anyhow!("最大顺序号必须大于0"));
        }

        Ok(())
    }

    pub fn parse_timezone(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("无效的时区 {}: {}", self.timezone, e))
    }

    /// 存放 machine.json 的目录，默认 `~/.fleetcron`
    pub fn resolve_home_dir(&self) -> PathBuf {
        match &self.home_dir {
            Some(dir) => dir.clone(),
            None => home::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".fleetcron"),
        }
    }
}

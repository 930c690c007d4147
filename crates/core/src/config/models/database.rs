use serde::{Deserialize, Serialize};

/// 共享存储配置（不支持热重载）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
    /// 每次存储调用的超时时间
    pub operation_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:fleetcron.db?mode=rwc".to_string(),
            max_connections: 5,
            connection_timeout_seconds: 10,
            operation_timeout_seconds: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("数据库URL不能为空"));
        }

        if !self.url.starts_with("postgresql://")
            && !self.url.starts_with("postgres://")
            && !self.url.starts_with("sqlite:")
        {
            return Err(anyhow::anyhow!(
                "数据库URL必须是PostgreSQL或SQLite格式: {}",
                self.url
            ));
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("最大连接数必须大于0"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }

        if self.operation_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("存储操作超时时间必须大于0"));
        }

        Ok(())
    }
}

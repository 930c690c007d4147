use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

const IDENTITY_FILE: &str = "machine.json";

/// 本机身份，首次启动时生成并持久化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineIdentity {
    pub machine_id: String,
    pub created_at: DateTime<Utc>,
}

impl MachineIdentity {
    pub fn path(home_dir: &Path) -> PathBuf {
        home_dir.join(IDENTITY_FILE)
    }

    /// 读取 `<home_dir>/machine.json`，不存在时生成新的 UUID 并写入
    pub fn load_or_create(home_dir: &Path) -> Result<Self> {
        let path = Self::path(home_dir);
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("读取身份文件失败: {}", path.display()))?;
            let identity: MachineIdentity = serde_json::from_str(&raw)
                .with_context(|| format!("身份文件格式错误: {}", path.display()))?;
            if identity.machine_id.trim().is_empty() {
                return Err(anyhow::anyhow!("身份文件中的 machine_id 为空: {}", path.display()));
            }
            return Ok(identity);
        }

        fs::create_dir_all(home_dir)
            .with_context(|| format!("创建目录失败: {}", home_dir.display()))?;
        let identity = MachineIdentity {
            machine_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        };
        let raw = serde_json::to_string_pretty(&identity).context("序列化身份文件失败")?;
        fs::write(&path, raw).with_context(|| format!("写入身份文件失败: {}", path.display()))?;
        info!("已生成新的机器身份: {} ({})", identity.machine_id, path.display());
        Ok(identity)
    }
}

/// 当前主机名，获取失败时为 "unknown"
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

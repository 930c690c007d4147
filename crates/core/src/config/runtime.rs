use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{AppConfig, HttpDefaults};
use crate::{SchedulerError, SchedulerResult};

/// 可热重载的运行期设置快照
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub timezone: Tz,
    pub secrets: HashMap<String, String>,
    pub http: HttpDefaults,
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> SchedulerResult<Self> {
        let timezone = config
            .agent
            .parse_timezone()
            .map_err(|e| SchedulerError::Configuration(e.to_string()))?;
        Ok(Self {
            timezone,
            secrets: config.secrets.clone(),
            http: config.http_defaults.clone(),
        })
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Seoul,
            secrets: HashMap::new(),
            http: HttpDefaults::default(),
        }
    }
}

/// 进程内共享的设置引用，读取方拿到的始终是完整的一份快照
#[derive(Debug, Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<Arc<RuntimeSettings>>>,
}

impl SharedSettings {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    pub async fn current(&self) -> Arc<RuntimeSettings> {
        self.inner.read().await.clone()
    }

    pub async fn replace(&self, settings: RuntimeSettings) {
        *self.inner.write().await = Arc::new(settings);
    }
}

/// 重新读取运行期设置（reload-config 命令使用）
#[async_trait]
pub trait SettingsLoader: Send + Sync {
    async fn load(&self) -> SchedulerResult<RuntimeSettings>;
}

/// 从启动时使用的同一配置文件重新读取
pub struct FileSettingsLoader {
    path: Option<PathBuf>,
}

impl FileSettingsLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SettingsLoader for FileSettingsLoader {
    async fn load(&self) -> SchedulerResult<RuntimeSettings> {
        let path = self.path.clone();
        debug!("读取运行时配置: {:?}", path);
        let config = tokio::task::spawn_blocking(move || AppConfig::load_from(path.as_deref()))
            .await
            .map_err(|e| SchedulerError::Internal(format!("配置读取任务失败: {e}")))?
            .map_err(|e| {
                warn!("读取运行时配置失败: {e:#}");
                SchedulerError::Configuration(format!("{e:#}"))
            })?;
        let settings = RuntimeSettings::from_config(&config)?;
        info!(
            "运行时配置已读取: timezone={}, secrets={}, http_timeout={}s",
            settings.timezone,
            settings.secrets.len(),
            settings.http.timeout_seconds
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn replace_swaps_whole_snapshot() {
        let shared = SharedSettings::new(RuntimeSettings::default());
        let before = shared.current().await;

        let mut next = RuntimeSettings::default();
        next.timezone = chrono_tz::UTC;
        next.secrets.insert("TOKEN".into(), "t".into());
        shared.replace(next).await;

        let after = shared.current().await;
        assert_eq!(before.timezone, chrono_tz::Asia::Seoul);
        assert!(before.secrets.is_empty());
        assert_eq!(after.timezone, chrono_tz::UTC);
        assert_eq!(after.secrets.get("TOKEN").map(String::as_str), Some("t"));
    }

    #[tokio::test]
    async fn file_loader_rereads_the_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[agent]\ntimezone = \"UTC\"\n[secrets]\nBASE_URL = \"https://a\"").unwrap();
        let loader = FileSettingsLoader::new(Some(file.path().to_path_buf()));

        let settings = loader.load().await.unwrap();
        assert_eq!(settings.timezone, chrono_tz::UTC);
        assert_eq!(settings.secrets.len(), 1);
    }

    #[tokio::test]
    async fn file_loader_reports_invalid_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[agent]\ntimezone = \"Nowhere/City\"").unwrap();
        let loader = FileSettingsLoader::new(Some(file.path().to_path_buf()));

        assert!(matches!(
            loader.load().await,
            Err(SchedulerError::Configuration(_))
        ));
    }
}

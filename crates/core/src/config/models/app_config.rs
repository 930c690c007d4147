use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{AgentConfig, DatabaseConfig, HttpDefaults};

/// 代理完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub agent: AgentConfig,
    pub http_defaults: HttpDefaults,
    /// 模板占位符 `{{KEY}}` 的取值来源
    pub secrets: HashMap<String, String>,
}

impl AppConfig {
    /// 未显式指定时依次查找的配置文件
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("fleetcron.toml"),
            PathBuf::from("config/fleetcron.toml"),
        ];
        if let Some(home) = home::home_dir() {
            paths.push(home.join(".fleetcron").join("fleetcron.toml"));
        }
        paths
    }

    /// 确定实际使用的配置文件路径
    ///
    /// 显式指定但不存在时报错；未指定时返回第一个存在的默认路径，都不存在则为 None。
    pub fn resolve_path(config_path: Option<&str>) -> Result<Option<PathBuf>> {
        match config_path {
            Some(path) => {
                let path = PathBuf::from(path);
                if path.exists() {
                    Ok(Some(path))
                } else {
                    Err(anyhow::anyhow!("配置文件不存在: {}", path.display()))
                }
            }
            None => Ok(Self::default_paths().into_iter().find(|p| p.exists())),
        }
    }

    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序:
    /// 1. 内置默认值
    /// 2. 配置文件（TOML）
    /// 3. 环境变量覆盖（前缀 `FLEETCRON_`，层级分隔符 `__`，如 `FLEETCRON_DATABASE__URL`）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = Self::resolve_path(config_path)?;
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("FLEETCRON")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.agent.validate().context("代理配置验证失败")?;
        self.http_defaults
            .validate()
            .context("HTTP默认配置验证失败")?;
        Ok(())
    }
}

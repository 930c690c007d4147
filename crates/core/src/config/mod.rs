//! 代理配置
//!
//! 启动时由 [`AppConfig::load`] 读取 TOML 文件和 `FLEETCRON_` 前缀的环境变量。
//! 运行期可热重载的部分（时区、密钥、HTTP默认值）被抽出为 [`RuntimeSettings`]，
//! 以不可变快照的形式放在 [`SharedSettings`] 中，重载时整体替换。

pub mod models;
pub mod runtime;

pub use models::{AgentConfig, AppConfig, DatabaseConfig, HttpDefaults, RetryDefaults};
pub use runtime::{FileSettingsLoader, RuntimeSettings, SettingsLoader, SharedSettings};

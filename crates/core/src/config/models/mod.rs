pub mod agent;
pub mod app_config;
pub mod database;
pub mod http_defaults;

pub use agent::AgentConfig;
pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use http_defaults::{HttpDefaults, RetryDefaults};

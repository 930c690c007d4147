use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 运维命令类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandType {
    #[serde(alias = "reload_jobs")]
    ReloadJobs,
    #[serde(alias = "reload_config")]
    ReloadConfig,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::ReloadJobs => "reload-jobs",
            CommandType::ReloadConfig => "reload-config",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reload-jobs" | "reload_jobs" => Ok(CommandType::ReloadJobs),
            "reload-config" | "reload_config" => Ok(CommandType::ReloadConfig),
            _ => Err(format!("未知的命令类型: {s}")),
        }
    }
}

/// 命令目标：全部机器或单台机器
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    All,
    Machine(String),
}

impl CommandTarget {
    pub fn as_str(&self) -> &str {
        match self {
            CommandTarget::All => "all",
            CommandTarget::Machine(id) => id,
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() || raw == "all" {
            CommandTarget::All
        } else {
            CommandTarget::Machine(raw.to_string())
        }
    }

    pub fn includes(&self, machine_id: &str) -> bool {
        match self {
            CommandTarget::All => true,
            CommandTarget::Machine(id) => id == machine_id,
        }
    }
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 运维命令。代理从不删除命令，只记录自己已消费
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: Uuid,
    pub command_type: CommandType,
    pub target: CommandTarget,
    pub issued_at: DateTime<Utc>,
    pub consumed_by: Vec<String>,
    pub payload: Option<serde_json::Value>,
}

impl Command {
    pub fn new(command_type: CommandType, target: CommandTarget) -> Self {
        Self {
            id: Uuid::new_v4(),
            command_type,
            target,
            issued_at: Utc::now(),
            consumed_by: Vec::new(),
            payload: None,
        }
    }

    pub fn is_consumed_by(&self, machine_id: &str) -> bool {
        self.consumed_by.iter().any(|id| id == machine_id)
    }

    /// 针对该机器且尚未被其消费
    pub fn is_pending_for(&self, machine_id: &str) -> bool {
        self.target.includes(machine_id) && !self.is_consumed_by(machine_id)
    }
}

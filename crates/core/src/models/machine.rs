use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 舰队中的一台机器（由本机代理独占写入心跳）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub machine_id: String,
    pub hostname: String,
    /// 运维分配的顺序号，可随时被外部修改，下一个时刻生效
    pub order: i32,
    /// 旧版字段，始终与 order 保持一致
    pub serial: i32,
    pub last_seen: DateTime<Utc>,
    pub status: MachineStatus,
    pub registered_at: DateTime<Utc>,
}

/// 机器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Online,
    Offline,
}

impl MachineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Online => "online",
            MachineStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(MachineStatus::Online),
            "offline" => Ok(MachineStatus::Offline),
            _ => Err(format!("无效的机器状态: {s}")),
        }
    }
}

impl Machine {
    /// 创建新的在线机器记录
    pub fn new(machine_id: impl Into<String>, hostname: impl Into<String>, order: i32) -> Self {
        let now = Utc::now();
        Self {
            machine_id: machine_id.into(),
            hostname: hostname.into(),
            order,
            serial: order,
            last_seen: now,
            status: MachineStatus::Online,
            registered_at: now,
        }
    }

    /// 在给定时间点、给定阈值下是否存活
    ///
    /// 存活 = 在线状态且 `now - last_seen <= staleness_threshold`。
    /// 主动下线（优雅关闭）的机器立即视为不存活。
    pub fn is_live_at(&self, now: DateTime<Utc>, staleness_threshold: Duration) -> bool {
        self.status == MachineStatus::Online && now - self.last_seen <= staleness_threshold
    }
}

/// 存活机器在排名计算中的视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveMachine {
    pub machine_id: String,
    pub order: i32,
}

impl From<&Machine> for LiveMachine {
    fn from(machine: &Machine) -> Self {
        Self {
            machine_id: machine.machine_id.clone(),
            order: machine.order,
        }
    }
}

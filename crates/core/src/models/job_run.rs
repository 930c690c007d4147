use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 仅由一台机器执行的任务使用的认领范围
pub const FLEET_SCOPE: &str = "fleet";

/// 任务运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobRunStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Pending => "pending",
            JobRunStatus::Running => "running",
            JobRunStatus::Success => "success",
            JobRunStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobRunStatus::Success | JobRunStatus::Error)
    }
}

impl fmt::Display for JobRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobRunStatus::Pending),
            "running" => Ok(JobRunStatus::Running),
            "success" => Ok(JobRunStatus::Success),
            "error" => Ok(JobRunStatus::Error),
            _ => Err(format!("无效的运行状态: {s}")),
        }
    }
}

/// job_runs 的唯一键
///
/// 仅领导者执行的任务 `claim_scope` 为 [`FLEET_SCOPE`]，全舰队同一时刻只能插入一次；
/// 全机器执行的任务以机器ID作为范围，每台机器各写一条。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobRunKey {
    pub job_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub claim_scope: String,
}

impl JobRunKey {
    pub fn fleet(job_id: impl Into<String>, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            scheduled_for,
            claim_scope: FLEET_SCOPE.to_string(),
        }
    }

    pub fn per_machine(
        job_id: impl Into<String>,
        scheduled_for: DateTime<Utc>,
        machine_id: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            scheduled_for,
            claim_scope: machine_id.into(),
        }
    }
}

impl fmt::Display for JobRunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}#{}",
            self.job_id,
            self.scheduled_for.format("%Y-%m-%dT%H:%MZ"),
            self.claim_scope
        )
    }
}

/// 单个动作的执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Error,
    SkippedWhen,
    SkippedUnsupported,
}

/// 动作链中每个动作的执行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub response_sample: Option<String>,
}

impl StepRecord {
    pub fn skipped(index: usize, name: impl Into<String>, status: StepStatus) -> Self {
        Self {
            index,
            name: name.into(),
            status,
            status_code: None,
            elapsed_ms: 0,
            attempts: 0,
            error: None,
            response_sample: None,
        }
    }
}

/// 执行器返回的动作链汇总结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRunResult {
    pub status: JobRunStatus,
    /// 所有动作的HTTP尝试次数之和
    pub attempts: u32,
    pub steps: Vec<StepRecord>,
    pub error_detail: Option<String>,
}

impl JobRunResult {
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: JobRunStatus::Error,
            attempts: 0,
            steps: Vec::new(),
            error_detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobRunStatus::Success
    }
}

/// 一次任务运行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub job_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub claim_scope: String,
    pub machine_id: String,
    pub status: JobRunStatus,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
    pub steps: Vec<StepRecord>,
    pub created_at: DateTime<Utc>,
}

impl JobRun {
    /// 认领时插入的 pending 记录
    pub fn pending(key: &JobRunKey, machine_id: impl Into<String>) -> Self {
        Self {
            job_id: key.job_id.clone(),
            scheduled_for: key.scheduled_for,
            claim_scope: key.claim_scope.clone(),
            machine_id: machine_id.into(),
            status: JobRunStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            error_detail: None,
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> JobRunKey {
        JobRunKey {
            job_id: self.job_id.clone(),
            scheduled_for: self.scheduled_for,
            claim_scope: self.claim_scope.clone(),
        }
    }
}

/// 认领结果。输掉认领是正常的并发结果，不是错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Won,
    Lost,
}

impl ClaimOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimOutcome::Won => "won",
            ClaimOutcome::Lost => "lost",
        }
    }
}

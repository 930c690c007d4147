use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{SchedulerError, SchedulerResult};

/// 任务执行模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// 全舰队只由一台机器执行（默认）
    #[default]
    #[serde(alias = "leader_only")]
    LeaderOnly,
    /// 每台存活机器各自执行
    #[serde(alias = "all_machines")]
    AllMachines,
}

/// 单条调度项。`hour` 为空表示每小时的 `minute` 分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    #[serde(default)]
    pub hour: Option<u32>,
    #[serde(default)]
    pub minute: u32,
}

impl ScheduleEntry {
    pub fn at(hour: u32, minute: u32) -> Self {
        Self {
            hour: Some(hour),
            minute,
        }
    }

    pub fn every_hour(minute: u32) -> Self {
        Self { hour: None, minute }
    }

    /// 检查本地时间的时、分是否命中该调度项
    pub fn matches(&self, hour: u32, minute: u32) -> bool {
        self.minute == minute && self.hour.is_none_or(|h| h == hour)
    }

    fn validate(&self, job_id: &str) -> SchedulerResult<()> {
        if self.minute > 59 {
            return Err(SchedulerError::InvalidJobDefinition(format!(
                "任务 {job_id} 的分钟超出范围: {}",
                self.minute
            )));
        }
        if let Some(hour) = self.hour {
            if hour > 23 {
                return Err(SchedulerError::InvalidJobDefinition(format!(
                    "任务 {job_id} 的小时超出范围: {hour}"
                )));
            }
        }
        Ok(())
    }
}

/// 重试策略。每个字段都可单独缺省，缺省时逐级回退（动作 → 任务 → 全局默认）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default, alias = "delay_seconds")]
    pub delay_sec: Option<f64>,
    /// 指数退避倍数，1.0 即固定间隔
    #[serde(default)]
    pub backoff: Option<f64>,
    #[serde(default, alias = "max_delay_seconds")]
    pub max_delay_sec: Option<f64>,
}

/// 单次重试等待的上限（秒），超过即视为无效定义
pub const MAX_RETRY_DELAY_SECONDS: f64 = 86_400.0;

impl RetryPolicy {
    fn validate(&self, job_id: &str) -> SchedulerResult<()> {
        let seconds = [("delay_sec", self.delay_sec), ("max_delay_sec", self.max_delay_sec)];
        for (field, value) in seconds {
            if let Some(value) = value {
                if !value.is_finite() || !(0.0..=MAX_RETRY_DELAY_SECONDS).contains(&value) {
                    return Err(SchedulerError::InvalidJobDefinition(format!(
                        "任务 {job_id} 的 retry.{field} 必须在 0~{MAX_RETRY_DELAY_SECONDS} 秒之间: {value}"
                    )));
                }
            }
        }
        if let Some(backoff) = self.backoff {
            if !backoff.is_finite() || backoff > 100.0 {
                return Err(SchedulerError::InvalidJobDefinition(format!(
                    "任务 {job_id} 的 retry.backoff 无效: {backoff}"
                )));
            }
        }
        Ok(())
    }
}

/// 动作的执行条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCondition {
    #[serde(default)]
    pub hour_in: Option<Vec<u32>>,
    #[serde(default)]
    pub minute_in: Option<Vec<u32>>,
}

impl ActionCondition {
    /// 以时刻在配置时区下的时、分求值
    pub fn matches(&self, hour: u32, minute: u32) -> bool {
        if let Some(hours) = &self.hour_in {
            if !hours.contains(&hour) {
                return false;
            }
        }
        if let Some(minutes) = &self.minute_in {
            if !minutes.contains(&minute) {
                return false;
            }
        }
        true
    }
}

fn default_action_type() -> String {
    "http".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_enabled() -> bool {
    true
}

/// 动作链中的一个HTTP动作，url/headers/params/body 均可包含 `{{KEY}}` 占位符
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type", default = "default_action_type")]
    pub action_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub timeout_sec: Option<u64>,
    #[serde(default)]
    pub when: Option<ActionCondition>,
    #[serde(default)]
    pub continue_on_failure: bool,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl Action {
    pub fn http(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            action_type: default_action_type(),
            name: None,
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            body: None,
            timeout_sec: None,
            when: None,
            continue_on_failure: false,
            retry: None,
        }
    }

    pub fn is_http(&self) -> bool {
        self.action_type.eq_ignore_ascii_case("http")
    }

    /// 日志与步骤记录中使用的名称
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) if !name.is_empty() => name,
            _ if !self.url.is_empty() => &self.url,
            _ => "(http)",
        }
    }
}

/// 规范化后的任务定义（每次重新加载时整体替换，代理只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub job_id: String,
    pub name: String,
    pub enabled: bool,
    pub schedules: Vec<ScheduleEntry>,
    pub actions: Vec<Action>,
    pub retry: Option<RetryPolicy>,
    pub timeout_sec: Option<u64>,
    pub execution_mode: ExecutionMode,
}

impl JobDefinition {
    /// 多个调度项取并集
    pub fn is_due_at_local(&self, hour: u32, minute: u32) -> bool {
        self.enabled && self.schedules.iter().any(|s| s.matches(hour, minute))
    }
}

/// 共享存储中 jobs 集合的原始文档
///
/// 同时兼容两种写法：`schedules: [{hour, minute}]` 或顶层 `hour`/`minute`；
/// 没有 `actions` 但有顶层 `url` 的旧版任务会被规范化为只有一个动作的链。
#[derive(Debug, Clone, Deserialize)]
pub struct JobDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub hour: Option<u32>,
    #[serde(default)]
    pub minute: Option<u32>,
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub timeout_sec: Option<u64>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl JobDocument {
    pub fn into_definition(self, job_id: impl Into<String>) -> SchedulerResult<JobDefinition> {
        let job_id = job_id.into();

        let schedules = if self.schedules.is_empty() {
            vec![ScheduleEntry {
                hour: self.hour,
                minute: self.minute.unwrap_or(0),
            }]
        } else {
            self.schedules
        };
        for schedule in &schedules {
            schedule.validate(&job_id)?;
        }

        let name = self.name.unwrap_or_else(|| job_id.clone());

        let actions = if !self.actions.is_empty() {
            self.actions
        } else if let Some(url) = self.url {
            vec![Action {
                name: Some(name.clone()),
                method: self.method.unwrap_or_else(default_method),
                headers: self.headers,
                params: self.params,
                body: self.body,
                ..Action::http("GET", url)
            }]
        } else {
            return Err(SchedulerError::InvalidJobDefinition(format!(
                "任务 {job_id} 既没有 actions 也没有 url"
            )));
        };

        let retries = self.retry.iter().chain(actions.iter().filter_map(|a| a.retry.as_ref()));
        for retry in retries {
            retry.validate(&job_id)?;
        }

        Ok(JobDefinition {
            job_id,
            name,
            enabled: self.enabled,
            schedules,
            actions,
            retry: self.retry,
            timeout_sec: self.timeout_sec,
            execution_mode: self.execution_mode,
        })
    }
}

/// 存储层返回的未解析任务
#[derive(Debug, Clone, PartialEq)]
pub struct StoredJob {
    pub job_id: String,
    pub document: serde_json::Value,
}

impl StoredJob {
    pub fn parse(&self) -> SchedulerResult<JobDefinition> {
        let document: JobDocument = serde_json::from_value(self.document.clone()).map_err(|e| {
            SchedulerError::InvalidJobDefinition(format!("任务 {} 文档解析失败: {e}", self.job_id))
        })?;
        document.into_definition(self.job_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_hour_matches_every_hour() {
        let entry = ScheduleEntry::every_hour(0);
        for hour in 0..24 {
            assert!(entry.matches(hour, 0));
            assert!(!entry.matches(hour, 1));
        }
    }

    #[test]
    fn fixed_hour_matches_only_that_hour() {
        let entry = ScheduleEntry::at(9, 30);
        assert!(entry.matches(9, 30));
        assert!(!entry.matches(10, 30));
        assert!(!entry.matches(9, 31));
    }

    #[test]
    fn schedules_array_takes_precedence() {
        let stored = StoredJob {
            job_id: "job-1".into(),
            document: json!({
                "name": "daily report",
                "hour": 1,
                "minute": 5,
                "schedules": [{"hour": 9, "minute": 0}, {"hour": null, "minute": 30}],
                "actions": [{"url": "https://example.com"}]
            }),
        };
        let job = stored.parse().unwrap();
        assert_eq!(job.schedules.len(), 2);
        assert!(job.is_due_at_local(9, 0));
        assert!(job.is_due_at_local(17, 30));
        assert!(!job.is_due_at_local(1, 5));
    }

    #[test]
    fn legacy_single_http_job_becomes_one_action() {
        let stored = StoredJob {
            job_id: "legacy".into(),
            document: json!({
                "name": "ping",
                "minute": 15,
                "method": "POST",
                "url": "{{BASE_URL}}/ping",
                "headers": {"X-Token": "{{TOKEN}}"},
                "body": {"hello": "world"}
            }),
        };
        let job = stored.parse().unwrap();
        assert_eq!(job.schedules, vec![ScheduleEntry::every_hour(15)]);
        assert_eq!(job.actions.len(), 1);
        let action = &job.actions[0];
        assert_eq!(action.method, "POST");
        assert_eq!(action.url, "{{BASE_URL}}/ping");
        assert_eq!(action.display_name(), "ping");
        assert!(action.is_http());
        assert_eq!(job.execution_mode, ExecutionMode::LeaderOnly);
    }

    #[test]
    fn job_without_actions_or_url_is_rejected() {
        let stored = StoredJob {
            job_id: "empty".into(),
            document: json!({"minute": 0}),
        };
        assert!(matches!(
            stored.parse(),
            Err(SchedulerError::InvalidJobDefinition(_))
        ));
    }

    #[test]
    fn out_of_range_schedule_is_rejected() {
        let stored = StoredJob {
            job_id: "bad".into(),
            document: json!({"hour": 24, "minute": 0, "url": "https://x"}),
        };
        assert!(stored.parse().is_err());
    }

    #[test]
    fn execution_mode_accepts_both_spellings() {
        let mode: ExecutionMode = serde_json::from_value(json!("all-machines")).unwrap();
        assert_eq!(mode, ExecutionMode::AllMachines);
        let mode: ExecutionMode = serde_json::from_value(json!("leader_only")).unwrap();
        assert_eq!(mode, ExecutionMode::LeaderOnly);
    }

    #[test]
    fn condition_checks_hour_and_minute_lists() {
        let condition = ActionCondition {
            hour_in: Some(vec![0, 12]),
            minute_in: None,
        };
        assert!(!condition.matches(6, 0));
        assert!(condition.matches(12, 0));

        let condition = ActionCondition {
            hour_in: None,
            minute_in: Some(vec![30]),
        };
        assert!(condition.matches(3, 30));
        assert!(!condition.matches(3, 0));
    }

    #[test]
    fn unbounded_retry_delays_are_rejected() {
        let stored = StoredJob {
            job_id: "huge".into(),
            document: json!({
                "minute": 0,
                "retry": {"retries": 1, "delay_sec": 1e300, "max_delay_sec": 1e300},
                "actions": [{"url": "https://x/a"}]
            }),
        };
        assert!(matches!(
            stored.parse(),
            Err(SchedulerError::InvalidJobDefinition(_))
        ));

        let per_action = StoredJob {
            job_id: "huge-action".into(),
            document: json!({
                "minute": 0,
                "actions": [{"url": "https://x/a", "retry": {"max_delay_sec": -1.0}}]
            }),
        };
        assert!(per_action.parse().is_err());

        let sane = StoredJob {
            job_id: "sane".into(),
            document: json!({
                "minute": 0,
                "retry": {"retries": 3, "delay_sec": 2.5, "backoff": 2.0, "max_delay_sec": 600},
                "url": "https://x/a"
            }),
        };
        assert!(sane.parse().is_ok());
    }

    #[test]
    fn disabled_job_is_never_due() {
        let stored = StoredJob {
            job_id: "off".into(),
            document: json!({"enabled": false, "minute": 0, "url": "https://x"}),
        };
        let job = stored.parse().unwrap();
        assert!(!job.is_due_at_local(3, 0));
    }
}

//! 测试数据构造器

use chrono::{DateTime, Duration, Utc};
use fleetcron_core::{
    Action, ActionCondition, ExecutionMode, JobDefinition, Machine, MachineStatus, RetryPolicy,
    ScheduleEntry, StoredJob,
};

/// 构造一台 `last_seen` 在 `now` 之前 `seconds_ago` 秒的在线机器
pub fn machine_seen(
    machine_id: &str,
    order: i32,
    now: DateTime<Utc>,
    seconds_ago: i64,
) -> Machine {
    let mut machine = Machine::new(machine_id, format!("{machine_id}.local"), order);
    machine.last_seen = now - Duration::seconds(seconds_ago);
    machine.registered_at = machine.last_seen;
    machine.status = MachineStatus::Online;
    machine
}

#[derive(Debug, Clone)]
pub struct JobDefinitionBuilder {
    job: JobDefinition,
}

impl JobDefinitionBuilder {
    pub fn new(job_id: &str) -> Self {
        Self {
            job: JobDefinition {
                job_id: job_id.to_string(),
                name: job_id.to_string(),
                enabled: true,
                schedules: Vec::new(),
                actions: Vec::new(),
                retry: None,
                timeout_sec: None,
                execution_mode: ExecutionMode::LeaderOnly,
            },
        }
    }

    pub fn at(mut self, hour: u32, minute: u32) -> Self {
        self.job.schedules.push(ScheduleEntry::at(hour, minute));
        self
    }

    pub fn every_hour_at(mut self, minute: u32) -> Self {
        self.job.schedules.push(ScheduleEntry::every_hour(minute));
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.job.execution_mode = mode;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.job.enabled = false;
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.job.actions.push(action);
        self
    }

    pub fn retry(mut self, retries: u32, delay_sec: f64) -> Self {
        self.job.retry = Some(RetryPolicy {
            retries: Some(retries),
            delay_sec: Some(delay_sec),
            backoff: Some(1.0),
            max_delay_sec: None,
        });
        self
    }

    pub fn build(mut self) -> JobDefinition {
        if self.job.actions.is_empty() {
            self.job
                .actions
                .push(Action::http("GET", format!("https://example.invalid/{}", self.job.job_id)));
        }
        self.job
    }

    /// 以存储中的文档形式输出
    pub fn stored(self) -> StoredJob {
        let job = self.build();
        StoredJob {
            job_id: job.job_id.clone(),
            document: serde_json::to_value(&job).unwrap(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionBuilder {
    action: Action,
}

impl ActionBuilder {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            action: Action::http("GET", url),
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            action: Action::http("POST", url),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.action.name = Some(name.to_string());
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.action.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.action.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.action.body = Some(body);
        self
    }

    pub fn continue_on_failure(mut self) -> Self {
        self.action.continue_on_failure = true;
        self
    }

    pub fn when_hour_in(mut self, hours: &[u32]) -> Self {
        self.action.when = Some(ActionCondition {
            hour_in: Some(hours.to_vec()),
            minute_in: None,
        });
        self
    }

    pub fn retry(mut self, retries: u32, delay_sec: f64, backoff: f64) -> Self {
        self.action.retry = Some(RetryPolicy {
            retries: Some(retries),
            delay_sec: Some(delay_sec),
            backoff: Some(backoff),
            max_delay_sec: None,
        });
        self
    }

    pub fn timeout_sec(mut self, seconds: u64) -> Self {
        self.action.timeout_sec = Some(seconds);
        self
    }

    pub fn kind(mut self, action_type: &str) -> Self {
        self.action.action_type = action_type.to_string();
        self
    }

    pub fn build(self) -> Action {
        self.action
    }
}

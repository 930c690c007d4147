//! 动作链执行器
//!
//! 严格按顺序执行任务的动作。单个动作的流程：
//! 1. `when` 条件不满足则跳过（视为成功，继续下一个）
//! 2. 解析占位符，失败即为该动作的终态失败，不重试
//! 3. 发送请求，失败（传输错误或非2xx）按重试策略重试
//! 4. 最终失败时若 `continue_on_failure` 为真则记录后继续，否则中止剩余动作

use std::time::{Duration, Instant};

use async_trait::async_trait;
use fleetcron_core::{
    Action, JobDefinition, JobExecutor, JobRunResult, JobRunStatus, RuntimeSettings,
    SchedulerError, SharedSettings, StepRecord, StepStatus, Tick,
};
use tracing::{debug, info, warn};

use crate::http_action::{HttpActionExecutor, PreparedRequest};
use crate::retry::EffectiveRetry;

pub struct ActionChainExecutor {
    http: HttpActionExecutor,
    settings: SharedSettings,
}

impl ActionChainExecutor {
    pub fn new(settings: SharedSettings) -> Self {
        Self {
            http: HttpActionExecutor::new(),
            settings,
        }
    }

    pub fn with_http(http: HttpActionExecutor, settings: SharedSettings) -> Self {
        Self { http, settings }
    }

    async fn run_action(
        &self,
        index: usize,
        action: &Action,
        job: &JobDefinition,
        settings: &RuntimeSettings,
    ) -> StepRecord {
        let mut step = StepRecord::skipped(index, action.display_name(), StepStatus::Error);

        let timeout = Duration::from_secs(
            action
                .timeout_sec
                .or(job.timeout_sec)
                .unwrap_or(settings.http.timeout_seconds),
        );

        let request = match PreparedRequest::prepare(action, &settings.secrets, timeout) {
            Ok(request) => request,
            Err(e) => {
                step.error = Some(e.to_string());
                return step;
            }
        };

        let retry = EffectiveRetry::resolve(
            action.retry.as_ref(),
            job.retry.as_ref(),
            &settings.http.retry,
        );

        let started = Instant::now();
        for attempt in 1..=retry.max_attempts() {
            step.attempts = attempt;
            match self
                .http
                .send(&request, settings.http.response_sample_max)
                .await
            {
                Ok(response) if response.is_success() => {
                    step.status = StepStatus::Ok;
                    step.status_code = Some(response.status_code);
                    step.response_sample = Some(response.body_sample);
                    step.error = None;
                    break;
                }
                Ok(response) => {
                    step.status_code = Some(response.status_code);
                    step.error = Some(format!("HTTP {}", response.status_code));
                    step.response_sample = Some(response.body_sample);
                }
                Err(e) => {
                    step.status_code = None;
                    step.error = Some(e.to_string());
                }
            }

            metrics::counter!("fleetcron_action_failures_total").increment(1);
            if attempt < retry.max_attempts() {
                let delay = retry.delay_before_retry(attempt);
                warn!(
                    job_id = %job.job_id,
                    action = %action.display_name(),
                    "动作第 {attempt} 次尝试失败: {}，{:?} 后重试",
                    step.error.as_deref().unwrap_or_default(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
        step.elapsed_ms = started.elapsed().as_millis() as u64;
        step
    }
}

#[async_trait]
impl JobExecutor for ActionChainExecutor {
    async fn run(&self, job: &JobDefinition, tick: &Tick) -> JobRunResult {
        // 整条链使用同一份设置快照
        let settings = self.settings.current().await;

        let mut steps = Vec::with_capacity(job.actions.len());
        let mut attempts = 0;
        let mut abort: Option<SchedulerError> = None;

        for (index, action) in job.actions.iter().enumerate() {
            let name = action.display_name();

            if let Some(condition) = &action.when {
                if !condition.matches(tick.hour(), tick.minute()) {
                    debug!(job_id = %job.job_id, action = %name, "条件不满足，跳过动作");
                    steps.push(StepRecord::skipped(index, name, StepStatus::SkippedWhen));
                    continue;
                }
            }

            if !action.is_http() {
                warn!(job_id = %job.job_id, action = %name, "不支持的动作类型: {}", action.action_type);
                steps.push(StepRecord::skipped(index, name, StepStatus::SkippedUnsupported));
                continue;
            }

            let step = self.run_action(index, action, job, &settings).await;
            attempts += step.attempts;

            if step.status == StepStatus::Error {
                let detail = step.error.clone().unwrap_or_default();
                if action.continue_on_failure {
                    warn!(job_id = %job.job_id, action = %name, "动作失败，继续执行后续动作: {detail}");
                    steps.push(step);
                    continue;
                }
                steps.push(step);
                abort = Some(SchedulerError::ChainAborted {
                    action: name.to_string(),
                    detail,
                });
                break;
            }

            steps.push(step);
        }

        let result = match abort {
            Some(e) => JobRunResult {
                status: JobRunStatus::Error,
                attempts,
                steps,
                error_detail: Some(e.to_string()),
            },
            None => JobRunResult {
                status: JobRunStatus::Success,
                attempts,
                steps,
                error_detail: None,
            },
        };

        info!(
            job_id = %job.job_id,
            scheduled_for = %tick.scheduled_for,
            "动作链执行完成: {} (共 {} 个动作)",
            result.status,
            result.steps.len()
        );
        result
    }
}

//! 动作重试策略
//!
//! 第 n 次重试前等待 `min(delay * backoff^(n-1), max_delay)` 秒；`backoff = 1.0` 即固定间隔。
//! 各字段按 动作 → 任务 → 全局默认 的顺序逐个回退。

use std::time::Duration;

use fleetcron_core::config::RetryDefaults;
use fleetcron_core::{RetryPolicy, MAX_RETRY_DELAY_SECONDS};

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveRetry {
    pub retries: u32,
    pub delay_seconds: f64,
    pub backoff: f64,
    pub max_delay_seconds: f64,
}

impl EffectiveRetry {
    pub fn resolve(
        action: Option<&RetryPolicy>,
        job: Option<&RetryPolicy>,
        defaults: &RetryDefaults,
    ) -> Self {
        let pick_u32 = |f: fn(&RetryPolicy) -> Option<u32>, fallback: u32| {
            action.and_then(f).or_else(|| job.and_then(f)).unwrap_or(fallback)
        };
        let pick_f64 = |f: fn(&RetryPolicy) -> Option<f64>, fallback: f64| {
            action.and_then(f).or_else(|| job.and_then(f)).unwrap_or(fallback)
        };

        Self {
            retries: pick_u32(|p| p.retries, defaults.retries),
            delay_seconds: pick_f64(|p| p.delay_sec, defaults.delay_seconds).max(0.0),
            backoff: pick_f64(|p| p.backoff, defaults.backoff).max(1.0),
            max_delay_seconds: pick_f64(|p| p.max_delay_sec, defaults.max_delay_seconds).max(0.0),
        }
    }

    /// 包括首次在内的最大尝试次数
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// 第 `retry` 次重试（从1开始）之前的等待时间
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let seconds = (self.delay_seconds * self.backoff.powi(exponent)).min(self.max_delay_seconds);
        if seconds.is_nan() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(seconds.clamp(0.0, MAX_RETRY_DELAY_SECONDS))
    }
}

//! 存储调用的超时处理
//!
//! 调度循环绝不能因为一次挂起的网络调用而停滞，所有存储操作都经由这里加上超时。

use std::future::Future;
use std::time::Duration;

use fleetcron_core::{SchedulerError, SchedulerResult};
use tokio::time::timeout;
use tracing::error;

#[derive(Debug, Clone, Copy)]
pub struct TimeoutHandler {
    store_timeout: Duration,
}

impl TimeoutHandler {
    pub fn new(store_timeout: Duration) -> Self {
        Self { store_timeout }
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// 在存储超时内执行操作
    pub async fn store_operation<F, T>(&self, operation: F, operation_name: &str) -> SchedulerResult<T>
    where
        F: Future<Output = SchedulerResult<T>>,
    {
        match timeout(self.store_timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "存储操作 '{operation_name}' 超时 (超时时间: {:?})",
                    self.store_timeout
                );
                Err(SchedulerError::Timeout {
                    operation: operation_name.to_string(),
                    timeout_ms: self.store_timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Default for TimeoutHandler {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_fast_operations() {
        let handler = TimeoutHandler::new(Duration::from_millis(100));
        let result = handler.store_operation(async { Ok(7) }, "fast").await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn passes_through_operation_errors() {
        let handler = TimeoutHandler::new(Duration::from_millis(100));
        let result: SchedulerResult<()> = handler
            .store_operation(
                async { Err(SchedulerError::StoreUnavailable("down".into())) },
                "failing",
            )
            .await;
        assert!(matches!(result, Err(SchedulerError::StoreUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_operation_times_out() {
        let handler = TimeoutHandler::new(Duration::from_secs(5));
        let result: SchedulerResult<()> = handler
            .store_operation(std::future::pending(), "machines.touch_heartbeat")
            .await;
        match result {
            Err(SchedulerError::Timeout {
                operation,
                timeout_ms,
            }) => {
                assert_eq!(operation, "machines.touch_heartbeat");
                assert_eq!(timeout_ms, 5000);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}

use serde::{Deserialize, Serialize};

/// 动作未指定时使用的重试默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryDefaults {
    pub retries: u32,
    pub delay_seconds: f64,
    pub backoff: f64,
    pub max_delay_seconds: f64,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            retries: 2,
            delay_seconds: 3.0,
            backoff: 1.5,
            max_delay_seconds: 60.0,
        }
    }
}

/// HTTP动作的默认参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpDefaults {
    pub timeout_seconds: u64,
    pub retry: RetryDefaults,
    /// 步骤记录中保存的响应体最大字符数
    pub response_sample_max: usize,
}

impl Default for HttpDefaults {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            retry: RetryDefaults::default(),
            response_sample_max: 2000,
        }
    }
}

impl HttpDefaults {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("HTTP超时时间必须大于0"));
        }

        if self.retry.delay_seconds < 0.0 {
            return Err(anyhow::anyhow!("重试间隔不能为负数"));
        }

        if self.retry.backoff < 1.0 {
            return Err(anyhow::anyhow!(
                "退避倍数不能小于1.0: {}",
                self.retry.backoff
            ));
        }

        if self.retry.max_delay_seconds < self.retry.delay_seconds {
            return Err(anyhow::anyhow!("最大重试间隔不能小于初始重试间隔"));
        }

        Ok(())
    }
}

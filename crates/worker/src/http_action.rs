//! 单次HTTP请求的准备与发送

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use fleetcron_core::{resolve_json, resolve_map, resolve_template, Action, SchedulerError, SchedulerResult};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

/// 占位符已全部解析的请求
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl PreparedRequest {
    /// 解析 url、headers、params、body 中的占位符
    ///
    /// 任何一个占位符找不到都会返回 `TemplateResolutionFailed`，调用方不应重试。
    pub fn prepare(
        action: &Action,
        secrets: &HashMap<String, String>,
        timeout: Duration,
    ) -> SchedulerResult<Self> {
        let method = Method::from_bytes(action.method.trim().to_uppercase().as_bytes())
            .map_err(|_| {
                SchedulerError::InvalidJobDefinition(format!("不支持的HTTP方法: {}", action.method))
            })?;

        Ok(Self {
            method,
            url: resolve_template(&action.url, secrets)?,
            headers: resolve_map(&action.headers, secrets)?,
            params: resolve_map(&action.params, secrets)?,
            body: action
                .body
                .as_ref()
                .map(|body| resolve_json(body, secrets))
                .transpose()?,
            timeout,
        })
    }
}

/// 一次尝试的结果。非2xx状态码不算传输错误，由调用方判定为失败
#[derive(Debug, Clone, PartialEq)]
pub struct HttpAttempt {
    pub status_code: u16,
    pub body_sample: String,
}

impl HttpAttempt {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status_code)
    }
}

/// HTTP动作执行器
#[derive(Debug, Clone)]
pub struct HttpActionExecutor {
    client: reqwest::Client,
}

impl HttpActionExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// 发送一次请求，响应体截断为 `sample_max` 个字符
    pub async fn send(&self, request: &PreparedRequest, sample_max: usize) -> SchedulerResult<HttpAttempt> {
        debug!("发送HTTP请求: {} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);

        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        builder = match &request.body {
            None | Some(Value::Null) => builder,
            Some(Value::String(raw)) => builder.body(raw.clone()),
            Some(json) => builder.json(json),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SchedulerError::ActionTransport(format!("请求超时 ({:?})", request.timeout))
            } else {
                SchedulerError::ActionTransport(format!("请求失败: {e}"))
            }
        })?;

        let status_code = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("读取响应体失败: {e}"));

        Ok(HttpAttempt {
            status_code,
            body_sample: body.chars().take(sample_max).collect(),
        })
    }
}

impl Default for HttpActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

use thiserror::Error;

/// 调度代理错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("共享存储不可用: {0}")]
    StoreUnavailable(String),

    #[error("操作超时: {operation} ({timeout_ms}ms)")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("模板占位符未解析: {{{{{key}}}}}")]
    TemplateResolutionFailed { key: String },

    #[error("动作传输失败: {0}")]
    ActionTransport(String),

    #[error("动作链中止于 {action}: {detail}")]
    ChainAborted { action: String, detail: String },

    #[error("无效的任务定义: {0}")]
    InvalidJobDefinition(String),

    #[error("机器未注册: {id}")]
    MachineNotFound { id: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 是否属于共享存储不可达一类的故障（本时刻放弃，下一时刻重新来过）
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Database(_)
                | SchedulerError::StoreUnavailable(_)
                | SchedulerError::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

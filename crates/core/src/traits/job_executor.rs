//! 任务执行器接口
//!
//! 认领成功后由协调器调用。执行器不返回错误：动作链内部的每一种失败
//! 都折叠进 [`JobRunResult`]，以便协调器总能把终态写回 job_runs。

use async_trait::async_trait;

use crate::models::{JobDefinition, JobRunResult, Tick};

#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// 顺序执行任务的动作链
    async fn run(&self, job: &JobDefinition, tick: &Tick) -> JobRunResult;
}

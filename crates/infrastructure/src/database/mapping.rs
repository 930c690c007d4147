//! PostgreSQL 与 SQLite 行映射的共用辅助函数

use std::str::FromStr;

use fleetcron_core::{SchedulerError, SchedulerResult, StepRecord};
use uuid::Uuid;

pub struct MappingHelpers;

impl MappingHelpers {
    /// 解析以文本存储的枚举列（状态、命令类型等）
    pub fn parse_enum<T>(raw: &str, column: &str) -> SchedulerResult<T>
    where
        T: FromStr<Err = String>,
    {
        raw.parse::<T>()
            .map_err(|e| SchedulerError::Serialization(format!("列 {column} 的值无效: {e}")))
    }

    pub fn parse_steps_sqlite(raw: &str) -> SchedulerResult<Vec<StepRecord>> {
        serde_json::from_str(raw)
            .map_err(|e| SchedulerError::Serialization(format!("解析步骤记录失败: {e}")))
    }

    pub fn parse_uuid_sqlite(raw: &str) -> SchedulerResult<Uuid> {
        Uuid::parse_str(raw)
            .map_err(|e| SchedulerError::Serialization(format!("解析命令ID失败: {e}")))
    }

    /// SQLite 的 group_concat 结果拆分为机器ID列表
    pub fn split_consumed_by(raw: Option<String>) -> Vec<String> {
        raw.map(|s| {
            s.split(',')
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcron_core::JobRunStatus;

    #[test]
    fn parses_known_enum_values() {
        let status: JobRunStatus = MappingHelpers::parse_enum("success", "status").unwrap();
        assert_eq!(status, JobRunStatus::Success);
        assert!(MappingHelpers::parse_enum::<JobRunStatus>("done", "status").is_err());
    }

    #[test]
    fn splits_group_concat_output() {
        assert_eq!(
            MappingHelpers::split_consumed_by(Some("a,b".into())),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(MappingHelpers::split_consumed_by(None).is_empty());
    }
}

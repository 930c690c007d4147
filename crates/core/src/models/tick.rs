use chrono::{DateTime, DurationRound, TimeDelta, Timelike, Utc};
use chrono_tz::Tz;

/// 一个调度时刻：截断到分钟，同时保留配置时区下的本地时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub scheduled_for: DateTime<Utc>,
    pub local: DateTime<Tz>,
}

impl Tick {
    pub fn at(instant: DateTime<Utc>, timezone: Tz) -> Self {
        let scheduled_for = instant
            .duration_trunc(TimeDelta::minutes(1))
            .unwrap_or(instant);
        Self {
            scheduled_for,
            local: scheduled_for.with_timezone(&timezone),
        }
    }

    /// 配置时区下的小时（已考虑夏令时）
    pub fn hour(&self) -> u32 {
        self.local.hour()
    }

    pub fn minute(&self) -> u32 {
        self.local.minute()
    }
}

pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod template;
pub mod traits;

pub use config::{AppConfig, FileSettingsLoader, RuntimeSettings, SettingsLoader, SharedSettings};
pub use errors::*;
pub use models::{
    Action, ActionCondition, ClaimOutcome, Command, CommandTarget, CommandType, ExecutionMode,
    JobDefinition, JobRun, JobRunKey, JobRunResult, JobRunStatus, LiveMachine, Machine,
    MachineStatus, RetryPolicy, ScheduleEntry, StepRecord, StepStatus, StoredJob, Tick,
    FLEET_SCOPE, MAX_RETRY_DELAY_SECONDS,
};
pub use template::{resolve_json, resolve_map, resolve_template};
pub use traits::{CommandRepository, JobExecutor, JobRepository, JobRunRepository, MachineRepository};

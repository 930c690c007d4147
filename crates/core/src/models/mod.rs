pub mod command;
pub mod job;
pub mod job_run;
pub mod machine;
pub mod tick;

pub use command::{Command, CommandTarget, CommandType};
pub use job::{
    Action, ActionCondition, ExecutionMode, JobDefinition, JobDocument, RetryPolicy,
    ScheduleEntry, StoredJob, MAX_RETRY_DELAY_SECONDS,
};
pub use job_run::{
    ClaimOutcome, JobRun, JobRunKey, JobRunResult, JobRunStatus, StepRecord, StepStatus,
    FLEET_SCOPE,
};
pub use machine::{LiveMachine, Machine, MachineStatus};
pub use tick::Tick;

pub mod database;
pub mod timed;
pub mod timeout_handler;

pub use database::*;
pub use timed::{TimedCommandRepository, TimedJobRepository, TimedJobRunRepository, TimedMachineRepository};
pub use timeout_handler::TimeoutHandler;

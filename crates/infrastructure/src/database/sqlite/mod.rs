pub mod sqlite_command_repository;
pub mod sqlite_job_repository;
pub mod sqlite_job_run_repository;
pub mod sqlite_machine_repository;

pub use sqlite_command_repository::SqliteCommandRepository;
pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_job_run_repository::SqliteJobRunRepository;
pub use sqlite_machine_repository::SqliteMachineRepository;

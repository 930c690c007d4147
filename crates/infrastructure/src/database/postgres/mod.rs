pub mod postgres_command_repository;
pub mod postgres_job_repository;
pub mod postgres_job_run_repository;
pub mod postgres_machine_repository;

pub use postgres_command_repository::PostgresCommandRepository;
pub use postgres_job_repository::PostgresJobRepository;
pub use postgres_job_run_repository::PostgresJobRunRepository;
pub use postgres_machine_repository::PostgresMachineRepository;

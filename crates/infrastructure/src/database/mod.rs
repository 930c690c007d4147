pub mod manager;
pub mod mapping;
pub mod postgres;
pub mod schema;
pub mod sqlite;

pub use manager::{DatabaseManager, DatabasePool, DatabaseType};
pub use postgres::{
    PostgresCommandRepository, PostgresJobRepository, PostgresJobRunRepository,
    PostgresMachineRepository,
};
pub use sqlite::{
    SqliteCommandRepository, SqliteJobRepository, SqliteJobRunRepository, SqliteMachineRepository,
};

pub mod job_executor;
pub mod repository;

pub use job_executor::*;
pub use repository::*;

//! 调度协调核心
//!
//! 每台机器上的代理以相同的逻辑独立运行，靠共享存储的唯一键保证每个任务
//! 在每个调度时刻全舰队只执行一次。

pub mod claim_coordinator;
pub mod command_channel;
pub mod job_catalog;
pub mod machine_registry;
pub mod tick_driver;

pub use claim_coordinator::{ClaimCoordinator, ClaimCoordinatorConfig, JobTickOutcome};
pub use command_channel::{send_command, CommandChannel, CommandChannelConfig};
pub use job_catalog::{is_due_at, CatalogSnapshot, JobCatalog};
pub use machine_registry::{next_free_order, rank_of, MachineRegistry, MachineRegistryConfig};
pub use tick_driver::{next_tick_after, TickDriver, TickDriverConfig, TickReport};

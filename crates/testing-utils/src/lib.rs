//! # fleetcron testing utils
//!
//! 各 crate 测试共用的内存仓储、执行器替身和数据构造器。
//!
//! 内存仓储遵守与真实存储相同的唯一性约束（认领键只能插入一次），
//! 并可通过 `set_unavailable(true)` 模拟共享存储不可达。
//!
//! ```toml
//! [dev-dependencies]
//! fleetcron-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;

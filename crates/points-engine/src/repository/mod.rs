//! 仓储层
//!
//! 提供账户、流水、奖励与兑换的数据访问接口。
//!
//! ## 设计原则
//!
//! - 仓储只负责持久化与原子性，业务规则（闸门、奖励计算）由纯函数模块提供
//! - PostgreSQL 实现使用 SQLx，行锁保证串行化
//! - 内存实现与 PostgreSQL 实现遵循相同的锁顺序（奖励 -> 孩子）
//! - 定义 trait 接口以支持 mock 测试

mod ledger_repo;
mod memory;
mod redemption_repo;
mod traits;

pub use ledger_repo::LedgerRepository;
pub use memory::InMemoryPointsStore;
pub use redemption_repo::RedemptionRepository;
pub use traits::*;

//! 积分引擎端到端测试
//!
//! 测试覆盖完整的家庭使用流程，包括：
//! - 一周的任务打卡、连续奖励与里程碑
//! - 兄弟姐妹争抢限量奖励
//! - 兑换审批、兑现与取消退款
//! - 账本回放与审计一致性

pub mod data;
pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;

//! 积分引擎领域模型
//!
//! 包含账户、流水、奖励与兑换的核心实体定义

pub mod account;
pub mod enums;
pub mod ledger;
pub mod reward;

// 重新导出常用类型
pub use account::{ChildAccount, ProgressUpdate};
pub use enums::{RedemptionStatus, ReferenceType, TransactionType};
pub use ledger::{LedgerEntry, LedgerReference, NewLedgerEntry, PointsBreakdown, replay_entries};
pub use reward::{
    CapCheckResult, CapViolation, RedemptionReceipt, RedemptionTransition, RedemptionUsage,
    Reward, RewardCapData, RewardRedemption,
};

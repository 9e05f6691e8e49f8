//! 家庭积分引擎
//!
//! 为家务/任务激励场景提供积分账本、等级、连续打卡与奖励兑换能力。
//!
//! ## 核心功能
//!
//! - **积分账本**：只追加的流水，每条记录携带变动后余额，账户余额与流水回放结果一致
//! - **任务入账**：基础积分叠加连续打卡、提前完成、里程碑奖励，并累计经验值与等级
//! - **奖励兑换**：过期、全家庭上限、个人上限三道闸门，并发下不超卖
//! - **账本审计**：回放流水校验余额，发现不一致时告警
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `leveling`: 等级与经验值计算
//! - `streak`: 连续打卡与任务奖励计算
//! - `guard`: 兑换闸门判定
//! - `projector`: 奖励上限展示数据计算
//! - `lock`: 分布式锁模块
//! - `repository`: 仓储层（PostgreSQL 与内存实现）
//! - `service`: 业务服务层

pub mod error;
pub mod guard;
pub mod leveling;
pub mod lock;
pub mod models;
pub mod projector;
pub mod repository;
pub mod service;
pub mod streak;

pub use error::{PointsError, Result};
pub use leveling::{LevelProgress, XpGain};
pub use lock::{LockConfig, LockGuard, LockManager};
pub use models::*;
pub use repository::{
    InMemoryPointsStore, LedgerRepository, LedgerRepositoryTrait, RedemptionRepository,
    RedemptionRepositoryTrait,
};
pub use service::{CapDataService, LedgerService, RedemptionService, dto};
pub use streak::{StreakState, TaskAward, TaskCompletion};

//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体存储，PostgreSQL 与内存实现共用同一组接口，
//! 同时支持 mock 测试

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    ChildAccount, LedgerEntry, NewLedgerEntry, ProgressUpdate, RedemptionReceipt,
    RedemptionStatus, RedemptionTransition, RedemptionUsage, Reward, RewardRedemption,
};

/// 积分账本仓储接口
///
/// `append` 必须在单个原子单元内完成：锁定账户、校验余额、写入流水、
/// 更新账户余额与进度。同一孩子的追加串行执行，不同孩子之间互不阻塞。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    async fn get_account(&self, child_id: &str) -> Result<Option<ChildAccount>>;

    /// 追加一条流水
    ///
    /// `progress` 的 expected_version 与账户当前版本不一致时返回 ConcurrencyConflict
    async fn append(
        &self,
        entry: &NewLedgerEntry,
        progress: Option<ProgressUpdate>,
    ) -> Result<LedgerEntry>;

    /// 按创建顺序列出全部流水
    async fn list_entries(&self, child_id: &str) -> Result<Vec<LedgerEntry>>;

    /// 最近的流水，新的在前
    async fn list_recent(&self, child_id: &str, limit: i64) -> Result<Vec<LedgerEntry>>;

    /// 所有已建账户的孩子
    async fn list_child_ids(&self) -> Result<Vec<String>>;
}

/// 奖励兑换仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RedemptionRepositoryTrait: Send + Sync {
    async fn get_reward(&self, reward_id: i64) -> Result<Option<Reward>>;

    /// 统计非取消状态的兑换次数（非事务读，允许轻微滞后）
    async fn count_redemptions(
        &self,
        reward_id: i64,
        child_id: Option<String>,
    ) -> Result<RedemptionUsage>;

    /// 原子地占用一个兑换名额
    ///
    /// 在同一事务内：锁定奖励 -> 统计占用 -> 评估闸门 -> 写入兑换记录 -> 追加扣减流水。
    /// 闸门拒绝时返回 CapViolation，余额不足时返回 InsufficientBalance，均不留下任何写入。
    async fn try_reserve_slot(
        &self,
        reward_id: i64,
        child_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RedemptionReceipt>;

    async fn get_redemption(&self, redemption_id: i64) -> Result<Option<RewardRedemption>>;

    /// 兑换状态流转；取消且 refund 为 true 时在同一事务内追加退款流水
    async fn transition_status(
        &self,
        redemption_id: i64,
        to: RedemptionStatus,
        refund: bool,
    ) -> Result<RedemptionTransition>;

    async fn list_by_child(&self, child_id: &str, limit: i64) -> Result<Vec<RewardRedemption>>;
}

//! 奖励兑换服务
//!
//! ## 兑换流程
//!
//! 1. 参数校验 -> 2. 获取按奖励的兑换锁 -> 3. 仓储事务内占用名额
//!    （锁定奖励、计数、闸门、写入兑换记录、扣减积分） -> 4. 释放锁
//!
//! ## 并发控制策略
//!
//! - 兑换锁：同一奖励的兑换请求排队进入，减少数据库行锁竞争
//! - 奖励行锁：仓储事务内 FOR UPDATE，计数与插入在同一临界区
//! - 有界重试：并发冲突按指数退避重试，超过次数后向调用方返回 ConcurrencyConflict

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use points_shared::config::EngineConfig;
use points_shared::observability::metrics as points_metrics;
use points_shared::retry::{RetryPolicy, retry_with_policy};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::error::{PointsError, Result};
use crate::guard;
use crate::lock::LockManager;
use crate::models::{
    CapCheckResult, RedemptionReceipt, RedemptionStatus, RedemptionTransition, Reward,
    RewardRedemption,
};
use crate::repository::RedemptionRepositoryTrait;
use crate::service::dto::{RedeemRewardRequest, RedemptionHistory};

mod lock_keys {
    pub fn reward(reward_id: i64) -> String {
        format!("redeem:reward:{}", reward_id)
    }
}

/// 奖励兑换服务
pub struct RedemptionService<R>
where
    R: RedemptionRepositoryTrait,
{
    redemption_repo: Arc<R>,
    lock_manager: Arc<LockManager>,
    retry_policy: RetryPolicy,
}

impl<R> RedemptionService<R>
where
    R: RedemptionRepositoryTrait,
{
    pub fn new(redemption_repo: Arc<R>, lock_manager: Arc<LockManager>, config: &EngineConfig) -> Self {
        Self {
            redemption_repo,
            lock_manager,
            retry_policy: RetryPolicy::with_attempts(
                config.max_attempts,
                config.retry_initial_delay(),
                config.retry_max_delay(),
            ),
        }
    }

    /// 兑换上限检查（只读判定）
    ///
    /// 基于调用方预取的奖励和实时计数给出结果；真正的授权在 `redeem` 的事务内重新判定
    #[instrument(skip(self, reward), fields(reward_id = reward_id, child_id = %child_id))]
    pub async fn check_redemption_caps(
        &self,
        reward_id: i64,
        child_id: &str,
        reward: &Reward,
    ) -> Result<CapCheckResult> {
        let usage = self
            .redemption_repo
            .count_redemptions(reward_id, Some(child_id.to_string()))
            .await?;

        Ok(guard::check_redemption_caps(reward, &usage, Utc::now()))
    }

    /// 兑换奖励
    ///
    /// 成功时返回兑换记录与扣减流水；闸门拒绝返回 CapViolation，余额不足返回
    /// InsufficientBalance，两者都不重试
    #[instrument(skip(self), fields(child_id = %request.child_id, reward_id = request.reward_id))]
    pub async fn redeem(&self, request: RedeemRewardRequest) -> Result<RedemptionReceipt> {
        request.validate()?;
        let started = Instant::now();

        let result = retry_with_policy(
            &self.retry_policy,
            "redeem_reward",
            PointsError::is_retryable,
            || self.reserve_under_lock(&request),
        )
        .await;

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(receipt) => {
                points_metrics::record_redemption("success", elapsed);
                points_metrics::record_ledger_append(receipt.ledger_entry.transaction_type.as_str());
                info!(
                    redemption_id = receipt.redemption.id,
                    points_spent = receipt.redemption.points_spent,
                    balance_after = receipt.ledger_entry.balance_after,
                    "奖励兑换成功"
                );
            }
            Err(PointsError::CapViolation(violation)) => {
                points_metrics::record_redemption(violation.outcome(), elapsed);
                warn!(reason = violation.reason(), "兑换被闸门拒绝");
            }
            Err(PointsError::InsufficientBalance {
                required,
                available,
            }) => {
                points_metrics::record_redemption("insufficient_balance", elapsed);
                warn!(required = required, available = available, "积分不足，兑换失败");
            }
            Err(e) if e.is_retryable() => {
                points_metrics::record_redemption("conflict", elapsed);
                points_metrics::record_concurrency_conflict("redeem_reward");
                warn!(error = %e, "兑换并发冲突，重试已耗尽");
            }
            Err(_) => points_metrics::record_redemption("error", elapsed),
        }

        result
    }

    /// 持有兑换锁占用一个名额
    async fn reserve_under_lock(&self, request: &RedeemRewardRequest) -> Result<RedemptionReceipt> {
        // 锁等待超时对调用方而言就是并发冲突
        let lock_guard = self
            .lock_manager
            .acquire(&lock_keys::reward(request.reward_id), None)
            .await
            .map_err(|e| match e {
                PointsError::LockConflict { resource } => {
                    warn!(resource = %resource, "兑换锁获取超时");
                    PointsError::ConcurrencyConflict
                }
                other => other,
            })?;

        let result = self
            .redemption_repo
            .try_reserve_slot(request.reward_id, &request.child_id, Utc::now())
            .await;

        // 释放失败不影响已提交的结果，锁会通过 TTL 过期
        if let Err(e) = lock_guard.release().await {
            warn!(reward_id = request.reward_id, error = %e, "兑换锁释放失败");
        }

        result
    }

    /// 家长审批
    #[instrument(skip(self))]
    pub async fn approve(&self, redemption_id: i64) -> Result<RewardRedemption> {
        let transition = self
            .transition(redemption_id, RedemptionStatus::Approved, false)
            .await?;
        Ok(transition.redemption)
    }

    /// 标记已兑现
    #[instrument(skip(self))]
    pub async fn fulfill(&self, redemption_id: i64) -> Result<RewardRedemption> {
        let transition = self
            .transition(redemption_id, RedemptionStatus::Fulfilled, false)
            .await?;
        Ok(transition.redemption)
    }

    /// 取消兑换，释放名额；refund 为 true 时退还积分
    #[instrument(skip(self))]
    pub async fn cancel(&self, redemption_id: i64, refund: bool) -> Result<RedemptionTransition> {
        self.transition(redemption_id, RedemptionStatus::Cancelled, refund)
            .await
    }

    async fn transition(
        &self,
        redemption_id: i64,
        to: RedemptionStatus,
        refund: bool,
    ) -> Result<RedemptionTransition> {
        let transition = retry_with_policy(
            &self.retry_policy,
            "redemption_transition",
            PointsError::is_retryable,
            || self.redemption_repo.transition_status(redemption_id, to, refund),
        )
        .await?;

        if let Some(ref entry) = transition.refund_entry {
            points_metrics::record_ledger_append(entry.transaction_type.as_str());
        }
        info!(
            redemption_id = redemption_id,
            status = to.as_str(),
            refunded = transition.refund_entry.is_some(),
            "兑换状态已更新"
        );

        Ok(transition)
    }

    // ==================== 查询 ====================

    pub async fn get_redemption(&self, redemption_id: i64) -> Result<RewardRedemption> {
        self.redemption_repo
            .get_redemption(redemption_id)
            .await?
            .ok_or(PointsError::RedemptionNotFound(redemption_id))
    }

    pub async fn list_child_redemptions(&self, child_id: &str, limit: i64) -> Result<RedemptionHistory> {
        let redemptions = self
            .redemption_repo
            .list_by_child(child_id, limit.clamp(1, 500))
            .await?;

        Ok(RedemptionHistory {
            child_id: child_id.to_string(),
            redemptions,
        })
    }
}

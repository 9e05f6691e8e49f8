//! 奖励兑换仓储（PostgreSQL）
//!
//! 兑换名额的占用在一个事务内完成：奖励行 `FOR UPDATE` 充当按奖励的排他锁，
//! 持锁期间完成计数、闸门评估、写入兑换记录和扣减流水

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};
use tracing::debug;

use super::ledger_repo::LedgerRepository;
use super::traits::RedemptionRepositoryTrait;
use crate::error::{PointsError, Result};
use crate::guard;
use crate::models::{
    LedgerReference, NewLedgerEntry, RedemptionReceipt, RedemptionStatus, RedemptionTransition,
    RedemptionUsage, Reward, RewardRedemption, TransactionType,
};

const REWARD_COLUMNS: &str = r#"
    id, name, points_cost, expires_at, max_redemptions_total,
    max_redemptions_per_child, is_active, created_at, updated_at
"#;

const REDEMPTION_COLUMNS: &str = r#"
    id, reward_id, child_id, status, points_spent, ledger_entry_id, created_at, updated_at
"#;

/// 奖励兑换仓储
pub struct RedemptionRepository {
    pool: PgPool,
}

impl RedemptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 奖励 ====================

    pub async fn get_reward(&self, reward_id: i64) -> Result<Option<Reward>> {
        let reward = sqlx::query_as::<_, Reward>(&format!(
            "SELECT {REWARD_COLUMNS} FROM rewards WHERE id = $1"
        ))
        .bind(reward_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reward)
    }

    /// 在事务中锁定奖励行
    pub async fn lock_reward_in_tx(tx: &mut PgConnection, reward_id: i64) -> Result<Reward> {
        sqlx::query_as::<_, Reward>(&format!(
            "SELECT {REWARD_COLUMNS} FROM rewards WHERE id = $1 FOR UPDATE"
        ))
        .bind(reward_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PointsError::RewardNotFound(reward_id))
    }

    // ==================== 计数 ====================

    pub async fn count_redemptions(
        &self,
        reward_id: i64,
        child_id: Option<&str>,
    ) -> Result<RedemptionUsage> {
        let mut conn = self.pool.acquire().await?;
        Self::count_redemptions_in_tx(&mut conn, reward_id, child_id).await
    }

    /// 统计非取消状态的兑换次数
    pub async fn count_redemptions_in_tx(
        tx: &mut PgConnection,
        reward_id: i64,
        child_id: Option<&str>,
    ) -> Result<RedemptionUsage> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status <> 'cancelled') AS total_used,
                COUNT(*) FILTER (WHERE status <> 'cancelled' AND child_id = $2) AS child_used
            FROM reward_redemptions
            WHERE reward_id = $1
            "#,
        )
        .bind(reward_id)
        .bind(child_id)
        .fetch_one(&mut *tx)
        .await?;

        Ok(RedemptionUsage {
            total_used: row.get("total_used"),
            child_used: child_id.map(|_| row.get("child_used")),
        })
    }

    // ==================== 兑换 ====================

    pub async fn try_reserve_slot(
        &self,
        reward_id: i64,
        child_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RedemptionReceipt> {
        let mut tx = self.pool.begin().await?;
        let receipt = Self::try_reserve_slot_in_tx(&mut tx, reward_id, child_id, now).await?;
        tx.commit().await?;
        Ok(receipt)
    }

    /// 在事务中占用兑换名额
    ///
    /// 锁顺序固定为 奖励 -> 账户
    pub async fn try_reserve_slot_in_tx(
        tx: &mut PgConnection,
        reward_id: i64,
        child_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RedemptionReceipt> {
        let reward = Self::lock_reward_in_tx(tx, reward_id).await?;
        if !reward.is_active {
            return Err(PointsError::RewardInactive(reward_id));
        }
        if reward.points_cost <= 0 {
            return Err(PointsError::Validation(format!(
                "奖励积分必须为正数: reward_id={reward_id}"
            )));
        }

        let usage = Self::count_redemptions_in_tx(tx, reward_id, Some(child_id)).await?;
        guard::evaluate_gates(&reward, &usage, now).map_err(PointsError::CapViolation)?;

        let redemption = sqlx::query_as::<_, RewardRedemption>(&format!(
            r#"
            INSERT INTO reward_redemptions (reward_id, child_id, status, points_spent, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {REDEMPTION_COLUMNS}
            "#
        ))
        .bind(reward_id)
        .bind(child_id)
        .bind(RedemptionStatus::Pending)
        .bind(reward.points_cost)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let debit = NewLedgerEntry::new(
            child_id,
            TransactionType::Redeemed,
            -reward.points_cost,
            LedgerReference::redemption(redemption.id),
        )
        .with_description(format!("兑换奖励: {}", reward.name));
        let ledger_entry = LedgerRepository::append_in_tx(tx, &debit, None).await?;

        sqlx::query(r#"UPDATE reward_redemptions SET ledger_entry_id = $2 WHERE id = $1"#)
            .bind(redemption.id)
            .bind(ledger_entry.id)
            .execute(&mut *tx)
            .await?;

        debug!(
            reward_id = reward_id,
            child_id = %child_id,
            redemption_id = redemption.id,
            total_used = usage.total_used + 1,
            "兑换名额已占用"
        );

        Ok(RedemptionReceipt {
            redemption: RewardRedemption {
                ledger_entry_id: Some(ledger_entry.id),
                ..redemption
            },
            ledger_entry,
        })
    }

    pub async fn get_redemption(&self, redemption_id: i64) -> Result<Option<RewardRedemption>> {
        let redemption = sqlx::query_as::<_, RewardRedemption>(&format!(
            "SELECT {REDEMPTION_COLUMNS} FROM reward_redemptions WHERE id = $1"
        ))
        .bind(redemption_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(redemption)
    }

    pub async fn transition_status(
        &self,
        redemption_id: i64,
        to: RedemptionStatus,
        refund: bool,
    ) -> Result<RedemptionTransition> {
        let mut tx = self.pool.begin().await?;
        let transition = Self::transition_status_in_tx(&mut tx, redemption_id, to, refund).await?;
        tx.commit().await?;
        Ok(transition)
    }

    /// 在事务中流转兑换状态
    pub async fn transition_status_in_tx(
        tx: &mut PgConnection,
        redemption_id: i64,
        to: RedemptionStatus,
        refund: bool,
    ) -> Result<RedemptionTransition> {
        let current = sqlx::query_as::<_, RewardRedemption>(&format!(
            "SELECT {REDEMPTION_COLUMNS} FROM reward_redemptions WHERE id = $1 FOR UPDATE"
        ))
        .bind(redemption_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PointsError::RedemptionNotFound(redemption_id))?;

        if !current.status.can_transition_to(to) {
            return Err(PointsError::InvalidStatusTransition {
                redemption_id,
                from: current.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        let updated = sqlx::query_as::<_, RewardRedemption>(&format!(
            r#"
            UPDATE reward_redemptions
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {REDEMPTION_COLUMNS}
            "#
        ))
        .bind(redemption_id)
        .bind(to)
        .fetch_one(&mut *tx)
        .await?;

        let refund_entry = if to == RedemptionStatus::Cancelled && refund && current.points_spent > 0 {
            let credit = NewLedgerEntry::new(
                current.child_id.as_str(),
                TransactionType::Adjustment,
                current.points_spent,
                LedgerReference::redemption(redemption_id),
            )
            .with_description("取消兑换退还积分");
            Some(LedgerRepository::append_in_tx(tx, &credit, None).await?)
        } else {
            None
        };

        Ok(RedemptionTransition {
            redemption: updated,
            refund_entry,
        })
    }

    pub async fn list_by_child(&self, child_id: &str, limit: i64) -> Result<Vec<RewardRedemption>> {
        let redemptions = sqlx::query_as::<_, RewardRedemption>(&format!(
            "SELECT {REDEMPTION_COLUMNS} FROM reward_redemptions WHERE child_id = $1 \
             ORDER BY id DESC LIMIT $2"
        ))
        .bind(child_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(redemptions)
    }
}

#[async_trait]
impl RedemptionRepositoryTrait for RedemptionRepository {
    async fn get_reward(&self, reward_id: i64) -> Result<Option<Reward>> {
        self.get_reward(reward_id).await
    }

    async fn count_redemptions(
        &self,
        reward_id: i64,
        child_id: Option<String>,
    ) -> Result<RedemptionUsage> {
        self.count_redemptions(reward_id, child_id.as_deref()).await
    }

    async fn try_reserve_slot(
        &self,
        reward_id: i64,
        child_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RedemptionReceipt> {
        self.try_reserve_slot(reward_id, child_id, now).await
    }

    async fn get_redemption(&self, redemption_id: i64) -> Result<Option<RewardRedemption>> {
        self.get_redemption(redemption_id).await
    }

    async fn transition_status(
        &self,
        redemption_id: i64,
        to: RedemptionStatus,
        refund: bool,
    ) -> Result<RedemptionTransition> {
        self.transition_status(redemption_id, to, refund).await
    }

    async fn list_by_child(&self, child_id: &str, limit: i64) -> Result<Vec<RewardRedemption>> {
        self.list_by_child(child_id, limit).await
    }
}

//! 内存仓储
//!
//! 基于 DashMap 的内存实现，同时实现账本与兑换两个仓储接口，
//! 适用于测试、本地开发与单实例部署。
//!
//! 串行化方式与 PostgreSQL 实现一致：按孩子、按奖励各一把异步互斥锁，
//! 兑换时加锁顺序固定为 奖励 -> 孩子。

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::traits::{LedgerRepositoryTrait, RedemptionRepositoryTrait};
use crate::error::{PointsError, Result};
use crate::guard;
use crate::models::{
    ChildAccount, LedgerEntry, LedgerReference, NewLedgerEntry, ProgressUpdate, RedemptionReceipt,
    RedemptionStatus, RedemptionTransition, RedemptionUsage, Reward, RewardRedemption,
    TransactionType,
};

type KeyedLocks<K> = DashMap<K, Arc<Mutex<()>>>;

/// 内存积分存储
#[derive(Debug, Default)]
pub struct InMemoryPointsStore {
    accounts: DashMap<String, ChildAccount>,
    entries: DashMap<String, Vec<LedgerEntry>>,
    rewards: DashMap<i64, Reward>,
    redemptions: DashMap<i64, RewardRedemption>,
    child_locks: KeyedLocks<String>,
    reward_locks: KeyedLocks<i64>,
    next_entry_id: AtomicI64,
    next_redemption_id: AtomicI64,
    next_reward_id: AtomicI64,
}

impl InMemoryPointsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入奖励定义，分配新的 ID
    pub fn insert_reward(&self, reward: Reward) -> Reward {
        let id = self.next_reward_id.fetch_add(1, Ordering::SeqCst) + 1;
        let reward = Reward { id, ..reward };
        self.rewards.insert(id, reward.clone());
        reward
    }

    /// 更新奖励定义（ID 不存在时返回 RewardNotFound）
    pub fn update_reward(&self, reward: Reward) -> Result<()> {
        match self.rewards.get_mut(&reward.id) {
            Some(mut existing) => {
                *existing = reward;
                Ok(())
            }
            None => Err(PointsError::RewardNotFound(reward.id)),
        }
    }

    /// 直接篡改账户余额，仅用于审计场景的故障注入
    #[doc(hidden)]
    pub fn overwrite_balance(&self, child_id: &str, balance: i64) {
        if let Some(mut account) = self.accounts.get_mut(child_id) {
            account.points_balance = balance;
        }
    }

    fn child_lock(&self, child_id: &str) -> Arc<Mutex<()>> {
        self.child_locks
            .entry(child_id.to_string())
            .or_default()
            .clone()
    }

    fn reward_lock(&self, reward_id: i64) -> Arc<Mutex<()>> {
        self.reward_locks.entry(reward_id).or_default().clone()
    }

    fn usage(&self, reward_id: i64, child_id: Option<&str>) -> RedemptionUsage {
        let mut usage = RedemptionUsage {
            total_used: 0,
            child_used: child_id.map(|_| 0),
        };

        for redemption in self.redemptions.iter() {
            if redemption.reward_id != reward_id || !redemption.status.counts_against_cap() {
                continue;
            }
            usage.total_used += 1;
            if let (Some(child_id), Some(child_used)) = (child_id, usage.child_used.as_mut()) {
                if redemption.child_id == child_id {
                    *child_used += 1;
                }
            }
        }

        usage
    }

    /// 持有孩子锁时追加流水
    ///
    /// 所有校验在写入之前完成，失败时不留下任何修改
    fn append_locked(&self, entry: &NewLedgerEntry, progress: Option<&ProgressUpdate>) -> Result<LedgerEntry> {
        entry.check()?;

        let now = Utc::now();
        let mut account = self
            .accounts
            .get(&entry.child_id)
            .map(|a| a.clone())
            .unwrap_or_else(|| ChildAccount::new(entry.child_id.as_str(), now));

        if let Some(progress) = progress {
            if progress.expected_version != account.version {
                return Err(PointsError::ConcurrencyConflict);
            }
            account.apply_progress(progress);
        }

        let mut written = entry.materialize(0, account.points_balance, now)?;
        let total_points_earned = entry.earned_total_after(account.total_points_earned)?;
        written.id = self.next_entry_id.fetch_add(1, Ordering::SeqCst) + 1;

        account.points_balance = written.balance_after;
        account.total_points_earned = total_points_earned;
        account.version += 1;
        account.updated_at = now;

        self.entries
            .entry(entry.child_id.clone())
            .or_default()
            .push(written.clone());
        self.accounts.insert(entry.child_id.clone(), account);

        Ok(written)
    }
}

#[async_trait]
impl LedgerRepositoryTrait for InMemoryPointsStore {
    async fn get_account(&self, child_id: &str) -> Result<Option<ChildAccount>> {
        Ok(self.accounts.get(child_id).map(|a| a.clone()))
    }

    async fn append(
        &self,
        entry: &NewLedgerEntry,
        progress: Option<ProgressUpdate>,
    ) -> Result<LedgerEntry> {
        let lock = self.child_lock(&entry.child_id);
        let _held = lock.lock().await;
        self.append_locked(entry, progress.as_ref())
    }

    async fn list_entries(&self, child_id: &str) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .get(child_id)
            .map(|e| e.clone())
            .unwrap_or_default())
    }

    async fn list_recent(&self, child_id: &str, limit: i64) -> Result<Vec<LedgerEntry>> {
        let mut entries = self.list_entries(child_id).await?;
        entries.reverse();
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn list_child_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.accounts.iter().map(|a| a.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl RedemptionRepositoryTrait for InMemoryPointsStore {
    async fn get_reward(&self, reward_id: i64) -> Result<Option<Reward>> {
        Ok(self.rewards.get(&reward_id).map(|r| r.clone()))
    }

    async fn count_redemptions(
        &self,
        reward_id: i64,
        child_id: Option<String>,
    ) -> Result<RedemptionUsage> {
        Ok(self.usage(reward_id, child_id.as_deref()))
    }

    async fn try_reserve_slot(
        &self,
        reward_id: i64,
        child_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RedemptionReceipt> {
        let reward_lock = self.reward_lock(reward_id);
        let _reward_held = reward_lock.lock().await;

        let reward = self
            .rewards
            .get(&reward_id)
            .map(|r| r.clone())
            .ok_or(PointsError::RewardNotFound(reward_id))?;
        if !reward.is_active {
            return Err(PointsError::RewardInactive(reward_id));
        }
        if reward.points_cost <= 0 {
            return Err(PointsError::Validation(format!(
                "奖励积分必须为正数: reward_id={reward_id}"
            )));
        }

        let usage = self.usage(reward_id, Some(child_id));
        guard::evaluate_gates(&reward, &usage, now).map_err(PointsError::CapViolation)?;

        let child_lock = self.child_lock(child_id);
        let _child_held = child_lock.lock().await;

        // 先分配兑换 ID 以便流水引用；扣减失败时该 ID 作废，不写入兑换记录
        let redemption_id = self.next_redemption_id.fetch_add(1, Ordering::SeqCst) + 1;
        let debit = NewLedgerEntry::new(
            child_id,
            TransactionType::Redeemed,
            -reward.points_cost,
            LedgerReference::redemption(redemption_id),
        )
        .with_description(format!("兑换奖励: {}", reward.name));
        let ledger_entry = self.append_locked(&debit, None)?;

        let redemption = RewardRedemption {
            id: redemption_id,
            reward_id,
            child_id: child_id.to_string(),
            status: RedemptionStatus::Pending,
            points_spent: reward.points_cost,
            ledger_entry_id: Some(ledger_entry.id),
            created_at: now,
            updated_at: now,
        };
        self.redemptions.insert(redemption_id, redemption.clone());

        Ok(RedemptionReceipt {
            redemption,
            ledger_entry,
        })
    }

    async fn get_redemption(&self, redemption_id: i64) -> Result<Option<RewardRedemption>> {
        Ok(self.redemptions.get(&redemption_id).map(|r| r.clone()))
    }

    async fn transition_status(
        &self,
        redemption_id: i64,
        to: RedemptionStatus,
        refund: bool,
    ) -> Result<RedemptionTransition> {
        let current = self
            .redemptions
            .get(&redemption_id)
            .map(|r| r.clone())
            .ok_or(PointsError::RedemptionNotFound(redemption_id))?;

        // 与兑换相同的锁顺序
        let reward_lock = self.reward_lock(current.reward_id);
        let _reward_held = reward_lock.lock().await;
        let child_lock = self.child_lock(&current.child_id);
        let _child_held = child_lock.lock().await;

        // 持锁后重新读取
        let current = self
            .redemptions
            .get(&redemption_id)
            .map(|r| r.clone())
            .ok_or(PointsError::RedemptionNotFound(redemption_id))?;

        if !current.status.can_transition_to(to) {
            return Err(PointsError::InvalidStatusTransition {
                redemption_id,
                from: current.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        let refund_entry = if to == RedemptionStatus::Cancelled && refund && current.points_spent > 0 {
            let credit = NewLedgerEntry::new(
                current.child_id.as_str(),
                TransactionType::Adjustment,
                current.points_spent,
                LedgerReference::redemption(redemption_id),
            )
            .with_description("取消兑换退还积分");
            Some(self.append_locked(&credit, None)?)
        } else {
            None
        };

        let updated = RewardRedemption {
            status: to,
            updated_at: Utc::now(),
            ..current
        };
        self.redemptions.insert(redemption_id, updated.clone());

        Ok(RedemptionTransition {
            redemption: updated,
            refund_entry,
        })
    }

    async fn list_by_child(&self, child_id: &str, limit: i64) -> Result<Vec<RewardRedemption>> {
        let mut redemptions: Vec<RewardRedemption> = self
            .redemptions
            .iter()
            .filter(|r| r.child_id == child_id)
            .map(|r| r.clone())
            .collect();
        redemptions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        redemptions.truncate(limit.max(0) as usize);
        Ok(redemptions)
    }
}

//! 积分账本服务
//!
//! 账本是孩子积分余额的唯一来源，所有入账/扣减都通过这里追加流水。
//!
//! ## 任务完成流程
//!
//! 1. 读取账户快照（含版本号） -> 2. 计算连续打卡、奖励构成与经验
//!    -> 3. 流水与进度在同一原子单元写入（版本校验） -> 4. 版本冲突时重新计算

use std::sync::Arc;

use chrono::Utc;
use points_shared::config::EngineConfig;
use points_shared::observability::metrics as points_metrics;
use points_shared::retry::{RetryPolicy, retry_with_policy};
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::error::{PointsError, Result};
use crate::leveling::{self, LevelProgress};
use crate::models::{
    ChildAccount, LedgerEntry, LedgerReference, NewLedgerEntry, ProgressUpdate, TransactionType,
    replay_entries,
};
use crate::repository::LedgerRepositoryTrait;
use crate::service::dto::{AccountSummary, CompleteTaskRequest, IntegrityReport, TaskCompletionResult};
use crate::streak;

/// 账本完整性异常的日志 target
pub const INTEGRITY_LOG_TARGET: &str = "points_engine::integrity";

/// 积分账本服务
pub struct LedgerService<L>
where
    L: LedgerRepositoryTrait,
{
    ledger_repo: Arc<L>,
    retry_policy: RetryPolicy,
    grace_period: chrono::Duration,
}

impl<L> LedgerService<L>
where
    L: LedgerRepositoryTrait,
{
    pub fn new(ledger_repo: Arc<L>, config: &EngineConfig) -> Self {
        Self {
            ledger_repo,
            retry_policy: RetryPolicy::with_attempts(
                config.max_attempts,
                config.retry_initial_delay(),
                config.retry_max_delay(),
            ),
            grace_period: chrono::Duration::hours(config.streak_grace_period_hours as i64),
        }
    }

    /// 追加一条流水
    ///
    /// 扣减超过余额时返回 InsufficientBalance，不重试
    #[instrument(
        skip(self, entry),
        fields(child_id = %entry.child_id, transaction_type = entry.transaction_type.as_str(), amount = entry.points_amount)
    )]
    pub async fn append_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        entry.check()?;

        let written = retry_with_policy(
            &self.retry_policy,
            "ledger_append",
            PointsError::is_retryable,
            || self.ledger_repo.append(&entry, None),
        )
        .await
        .inspect_err(|e| {
            if e.is_retryable() {
                points_metrics::record_concurrency_conflict("ledger_append");
            }
        })?;

        points_metrics::record_ledger_append(written.transaction_type.as_str());
        info!(
            entry_id = written.id,
            balance_after = written.balance_after,
            "积分流水已追加"
        );

        Ok(written)
    }

    /// 任务完成入账
    ///
    /// 奖励积分、连续打卡、里程碑水位线、等级与经验在同一原子单元写入
    #[instrument(skip(self, request), fields(child_id = %request.child_id, task_id = %request.task_id))]
    pub async fn complete_task(&self, request: CompleteTaskRequest) -> Result<TaskCompletionResult> {
        request.validate()?;

        let result = retry_with_policy(
            &self.retry_policy,
            "complete_task",
            PointsError::is_retryable,
            || self.try_complete_task(&request),
        )
        .await
        .inspect_err(|e| {
            if e.is_retryable() {
                points_metrics::record_concurrency_conflict("complete_task");
            }
        })?;

        points_metrics::record_ledger_append(TransactionType::Earned.as_str());
        points_metrics::record_task_completion(result.milestone_paid.is_some());

        if let Some(milestone) = result.milestone_paid {
            info!(
                streak_days = result.streak.current_days,
                milestone = milestone,
                "连续打卡里程碑奖励已发放"
            );
        }
        if result.leveled_up {
            info!(level = result.level.level, "孩子已升级");
        }
        info!(
            entry_id = result.entry.id,
            points = result.points_awarded,
            balance_after = result.entry.balance_after,
            "任务奖励已入账"
        );

        Ok(result)
    }

    /// 基于一次账户快照计算并写入
    async fn try_complete_task(&self, request: &CompleteTaskRequest) -> Result<TaskCompletionResult> {
        let account = self
            .ledger_repo
            .get_account(&request.child_id)
            .await?
            .unwrap_or_else(|| ChildAccount::new(request.child_id.as_str(), Utc::now()));

        let grace = request
            .grace_period_hours
            .map(|h| chrono::Duration::hours(h as i64))
            .unwrap_or(self.grace_period);

        let award = streak::compute_task_award(&account.streak_state(), &request.completion(), grace);
        let gain = leveling::apply_xp(
            account.level.max(1) as u32,
            account.experience_points.max(0) as u128,
            award.xp_gained,
        );

        let progress = ProgressUpdate::new(account.version, &gain.progress, &award.streak);
        let entry = NewLedgerEntry::new(
            request.child_id.as_str(),
            TransactionType::Earned,
            award.total_points,
            LedgerReference::task(request.task_id.as_str()),
        )
        .with_breakdown(award.breakdown.clone());

        let written = self.ledger_repo.append(&entry, Some(progress)).await?;

        Ok(TaskCompletionResult {
            entry: written,
            breakdown: award.breakdown,
            points_awarded: award.total_points,
            xp_gained: award.xp_gained,
            level: gain.progress,
            leveled_up: gain.leveled_up(),
            streak: award.streak,
            milestone_paid: award.milestone_paid,
        })
    }

    // ==================== 查询 ====================

    pub async fn get_account(&self, child_id: &str) -> Result<ChildAccount> {
        self.ledger_repo
            .get_account(child_id)
            .await?
            .ok_or_else(|| PointsError::ChildNotFound(child_id.to_string()))
    }

    /// 当前余额，尚未建账的孩子余额为 0
    pub async fn get_balance(&self, child_id: &str) -> Result<i64> {
        Ok(self
            .ledger_repo
            .get_account(child_id)
            .await?
            .map(|a| a.points_balance)
            .unwrap_or(0))
    }

    pub async fn get_level_progress(&self, child_id: &str) -> Result<LevelProgress> {
        Ok(self
            .ledger_repo
            .get_account(child_id)
            .await?
            .map(|a| a.level_progress())
            .unwrap_or_else(|| leveling::level_from_xp(0)))
    }

    /// 按创建顺序列出全部流水
    pub async fn list_entries(&self, child_id: &str) -> Result<Vec<LedgerEntry>> {
        self.ledger_repo.list_entries(child_id).await
    }

    /// 最近的流水，新的在前
    pub async fn list_recent_entries(&self, child_id: &str, limit: i64) -> Result<Vec<LedgerEntry>> {
        if !(1..=500).contains(&limit) {
            return Err(PointsError::Validation(format!(
                "limit 必须在1-500之间: {limit}"
            )));
        }
        self.ledger_repo.list_recent(child_id, limit).await
    }

    #[instrument(skip(self))]
    pub async fn get_account_summary(&self, child_id: &str, recent_limit: i64) -> Result<AccountSummary> {
        let account = self.get_account(child_id).await?;
        let recent_entries = self.list_recent_entries(child_id, recent_limit).await?;

        Ok(AccountSummary {
            level: account.level_progress(),
            account,
            recent_entries,
        })
    }

    pub async fn list_child_ids(&self) -> Result<Vec<String>> {
        self.ledger_repo.list_child_ids().await
    }

    // ==================== 审计 ====================

    /// 回放流水校验余额
    ///
    /// 回放结果与账户余额不一致，或 balance_after 链条断裂时返回 IntegrityViolation
    #[instrument(skip(self))]
    pub async fn verify_integrity(&self, child_id: &str) -> Result<IntegrityReport> {
        let account = self.get_account(child_id).await?;
        let entries = self.ledger_repo.list_entries(child_id).await?;

        let replayed_balance = match replay_entries(&entries) {
            Ok(balance) => balance,
            Err(broken_entry_id) => {
                let replayed: i64 = entries.iter().map(|e| e.points_amount).sum();
                error!(
                    target: INTEGRITY_LOG_TARGET,
                    child_id = %child_id,
                    broken_entry_id = broken_entry_id,
                    "流水 balance_after 链条断裂"
                );
                return Err(self.integrity_violation(&account, replayed));
            }
        };

        if replayed_balance != account.points_balance {
            error!(
                target: INTEGRITY_LOG_TARGET,
                child_id = %child_id,
                stored_balance = account.points_balance,
                replayed_balance = replayed_balance,
                "账户余额与流水回放结果不一致"
            );
            return Err(self.integrity_violation(&account, replayed_balance));
        }

        Ok(IntegrityReport {
            child_id: child_id.to_string(),
            entry_count: entries.len(),
            stored_balance: account.points_balance,
            replayed_balance,
        })
    }

    fn integrity_violation(&self, account: &ChildAccount, replayed_balance: i64) -> PointsError {
        points_metrics::record_integrity_violation();
        warn!(child_id = %account.child_id, "需要人工介入核对账本");
        PointsError::IntegrityViolation {
            child_id: account.child_id.clone(),
            stored_balance: account.points_balance,
            replayed_balance,
        }
    }
}

//! 积分账本仓储（PostgreSQL）
//!
//! 账户行 `SELECT ... FOR UPDATE` 保证同一孩子的追加串行化，
//! 流水写入与账户更新在同一事务内提交。
//!
//! 流水按 id 排序回放：id 在持有账户行锁时分配，同一孩子内与提交顺序一致，
//! 不受应用服务器时钟回拨或多实例时钟偏差影响

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool, Row};

use super::traits::LedgerRepositoryTrait;
use crate::error::{PointsError, Result};
use crate::models::{ChildAccount, LedgerEntry, NewLedgerEntry, ProgressUpdate};

const ACCOUNT_COLUMNS: &str = r#"
    child_id, points_balance, total_points_earned, level, experience_points,
    current_streak_days, longest_streak_days, last_streak_date, last_milestone_paid,
    version, created_at, updated_at
"#;

const ENTRY_COLUMNS: &str = r#"
    id, child_id, transaction_type, points_amount, balance_after,
    reference_type, reference_id, breakdown, description, created_at
"#;

/// 积分账本仓储
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_account(&self, child_id: &str) -> Result<Option<ChildAccount>> {
        let account = sqlx::query_as::<_, ChildAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM child_accounts WHERE child_id = $1"
        ))
        .bind(child_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// 在事务中锁定账户行，账户不存在时先创建
    pub async fn lock_account_in_tx(tx: &mut PgConnection, child_id: &str) -> Result<ChildAccount> {
        sqlx::query(
            r#"
            INSERT INTO child_accounts (child_id)
            VALUES ($1)
            ON CONFLICT (child_id) DO NOTHING
            "#,
        )
        .bind(child_id)
        .execute(&mut *tx)
        .await?;

        let account = sqlx::query_as::<_, ChildAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM child_accounts WHERE child_id = $1 FOR UPDATE"
        ))
        .bind(child_id)
        .fetch_one(&mut *tx)
        .await?;

        Ok(account)
    }

    /// 追加流水
    pub async fn append(
        &self,
        entry: &NewLedgerEntry,
        progress: Option<&ProgressUpdate>,
    ) -> Result<LedgerEntry> {
        let mut tx = self.pool.begin().await?;
        let written = Self::append_in_tx(&mut tx, entry, progress).await?;
        tx.commit().await?;
        Ok(written)
    }

    /// 在事务中追加流水
    ///
    /// 调用方负责提交；兑换、退款与流水共享同一事务
    pub async fn append_in_tx(
        tx: &mut PgConnection,
        entry: &NewLedgerEntry,
        progress: Option<&ProgressUpdate>,
    ) -> Result<LedgerEntry> {
        entry.check()?;

        let mut account = Self::lock_account_in_tx(tx, &entry.child_id).await?;

        if let Some(progress) = progress {
            if progress.expected_version != account.version {
                return Err(PointsError::ConcurrencyConflict);
            }
            account.apply_progress(progress);
        }

        let now = Utc::now();
        let pending = entry.materialize(0, account.points_balance, now)?;
        let total_points_earned = entry.earned_total_after(account.total_points_earned)?;

        let row = sqlx::query(
            r#"
            INSERT INTO ledger_entries (child_id, transaction_type, points_amount, balance_after,
                                        reference_type, reference_id, breakdown, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(&pending.child_id)
        .bind(pending.transaction_type)
        .bind(pending.points_amount)
        .bind(pending.balance_after)
        .bind(pending.reference_type)
        .bind(&pending.reference_id)
        .bind(&pending.breakdown)
        .bind(&pending.description)
        .bind(pending.created_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE child_accounts
            SET points_balance = $2,
                total_points_earned = $3,
                level = $4,
                experience_points = $5,
                current_streak_days = $6,
                longest_streak_days = $7,
                last_streak_date = $8,
                last_milestone_paid = $9,
                version = version + 1,
                updated_at = $10
            WHERE child_id = $1
            "#,
        )
        .bind(&account.child_id)
        .bind(pending.balance_after)
        .bind(total_points_earned)
        .bind(account.level)
        .bind(account.experience_points)
        .bind(account.current_streak_days)
        .bind(account.longest_streak_days)
        .bind(account.last_streak_date)
        .bind(account.last_milestone_paid)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        Ok(LedgerEntry {
            id: row.get("id"),
            ..pending
        })
    }

    pub async fn list_entries(&self, child_id: &str) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE child_id = $1 ORDER BY id ASC"
        ))
        .bind(child_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn list_recent(&self, child_id: &str, limit: i64) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE child_id = $1 \
             ORDER BY id DESC LIMIT $2"
        ))
        .bind(child_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn list_child_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(r#"SELECT child_id FROM child_accounts ORDER BY child_id"#)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| row.get("child_id")).collect())
    }
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    async fn get_account(&self, child_id: &str) -> Result<Option<ChildAccount>> {
        self.get_account(child_id).await
    }

    async fn append(
        &self,
        entry: &NewLedgerEntry,
        progress: Option<ProgressUpdate>,
    ) -> Result<LedgerEntry> {
        self.append(entry, progress.as_ref()).await
    }

    async fn list_entries(&self, child_id: &str) -> Result<Vec<LedgerEntry>> {
        self.list_entries(child_id).await
    }

    async fn list_recent(&self, child_id: &str, limit: i64) -> Result<Vec<LedgerEntry>> {
        self.list_recent(child_id, limit).await
    }

    async fn list_child_ids(&self) -> Result<Vec<String>> {
        self.list_child_ids().await
    }
}

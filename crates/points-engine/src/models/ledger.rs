//! 积分账本流水
//!
//! 流水一经写入不可修改，更正以新的 adjustment 流水表达

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use validator::Validate;

use super::enums::{ReferenceType, TransactionType};
use crate::error::{PointsError, Result};

/// 奖励构成明细，如 {base: 10, streak: 2, early: 1}
pub type PointsBreakdown = BTreeMap<String, i64>;

/// 账本流水
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    pub child_id: String,
    pub transaction_type: TransactionType,
    /// 带符号的变动值：正数入账，负数扣减
    pub points_amount: i64,
    /// 本条流水之后的余额
    pub balance_after: i64,
    pub reference_type: ReferenceType,
    #[sqlx(default)]
    pub reference_id: Option<String>,
    #[sqlx(default)]
    pub breakdown: Option<Json<PointsBreakdown>>,
    #[sqlx(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn breakdown(&self) -> Option<&PointsBreakdown> {
        self.breakdown.as_ref().map(|b| &b.0)
    }

    /// 本条流水之前的余额
    pub fn balance_before(&self) -> i64 {
        self.balance_after - self.points_amount
    }
}

/// 流水关联的业务对象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReference {
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
}

impl LedgerReference {
    pub fn task(task_id: impl Into<String>) -> Self {
        Self {
            reference_type: ReferenceType::Task,
            reference_id: Some(task_id.into()),
        }
    }

    pub fn redemption(redemption_id: i64) -> Self {
        Self {
            reference_type: ReferenceType::RewardRedemption,
            reference_id: Some(redemption_id.to_string()),
        }
    }

    pub fn manual(reference_id: Option<String>) -> Self {
        Self {
            reference_type: ReferenceType::Manual,
            reference_id,
        }
    }

    pub fn system() -> Self {
        Self {
            reference_type: ReferenceType::System,
            reference_id: None,
        }
    }
}

/// 待追加的流水
///
/// balance_after 由仓储在持有账户锁时计算，调用方不提供
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewLedgerEntry {
    #[validate(length(min = 1, max = 64, message = "child_id 长度必须在1-64个字符之间"))]
    pub child_id: String,
    pub transaction_type: TransactionType,
    pub points_amount: i64,
    pub reference: LedgerReference,
    pub breakdown: Option<PointsBreakdown>,
    #[validate(length(max = 255, message = "描述不能超过255个字符"))]
    pub description: Option<String>,
}

impl NewLedgerEntry {
    pub fn new(
        child_id: impl Into<String>,
        transaction_type: TransactionType,
        points_amount: i64,
        reference: LedgerReference,
    ) -> Self {
        Self {
            child_id: child_id.into(),
            transaction_type,
            points_amount,
            reference,
            breakdown: None,
            description: None,
        }
    }

    pub fn with_breakdown(mut self, breakdown: PointsBreakdown) -> Self {
        self.breakdown = Some(breakdown);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 完整校验：字段长度、金额符号、明细合计
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if !self.transaction_type.accepts_amount(self.points_amount) {
            return Err(PointsError::Validation(format!(
                "积分数额与交易类型不匹配: type={}, amount={}",
                self.transaction_type.as_str(),
                self.points_amount
            )));
        }

        if let Some(breakdown) = &self.breakdown {
            let sum = breakdown
                .values()
                .try_fold(0i64, |acc, v| acc.checked_add(*v))
                .ok_or_else(|| PointsError::Validation("明细合计溢出".to_string()))?;
            if sum != self.points_amount {
                return Err(PointsError::Validation(format!(
                    "明细合计 {} 与积分数额 {} 不一致",
                    sum, self.points_amount
                )));
            }
        }

        Ok(())
    }

    /// 基于当前余额生成落库流水
    ///
    /// 负数金额超过余额时返回 InsufficientBalance
    pub fn materialize(&self, id: i64, current_balance: i64, now: DateTime<Utc>) -> Result<LedgerEntry> {
        if self.points_amount < 0 {
            // i64::MIN 取反溢出，按最大需求处理
            let required = self.points_amount.checked_neg().unwrap_or(i64::MAX);
            if required > current_balance {
                return Err(PointsError::InsufficientBalance {
                    required,
                    available: current_balance,
                });
            }
        }

        let balance_after = current_balance.checked_add(self.points_amount).ok_or_else(|| {
            PointsError::Validation(format!(
                "积分余额溢出: balance={}, amount={}",
                current_balance, self.points_amount
            ))
        })?;

        Ok(LedgerEntry {
            id,
            child_id: self.child_id.clone(),
            transaction_type: self.transaction_type,
            points_amount: self.points_amount,
            balance_after,
            reference_type: self.reference.reference_type,
            reference_id: self.reference.reference_id.clone(),
            breakdown: self.breakdown.clone().map(Json),
            description: self.description.clone(),
            created_at: now,
        })
    }

    /// 写入本条流水后的累计获得积分，仅入账类型计入
    pub fn earned_total_after(&self, current_total: i64) -> Result<i64> {
        if !self.transaction_type.is_credit() {
            return Ok(current_total);
        }
        current_total.checked_add(self.points_amount).ok_or_else(|| {
            PointsError::Validation(format!(
                "累计获得积分溢出: total={}, amount={}",
                current_total, self.points_amount
            ))
        })
    }
}

/// 按写入顺序（流水 ID 递增）回放流水，校验 balance_after 链条
///
/// 返回回放得到的最终余额；链条断裂或累加溢出时返回该位置的流水 ID
pub fn replay_entries(entries: &[LedgerEntry]) -> std::result::Result<i64, i64> {
    let mut balance = 0i64;
    for entry in entries {
        balance = balance.checked_add(entry.points_amount).ok_or(entry.id)?;
        if entry.balance_after != balance {
            return Err(entry.id);
        }
    }
    Ok(balance)
}

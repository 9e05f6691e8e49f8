//! 积分引擎枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 账本交易类型
///
/// 符号约束：earned/bonus 为正，redeemed/penalty 为负，adjustment 可正可负
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum TransactionType {
    /// 完成任务获得
    Earned,
    /// 兑换奖励消耗
    Redeemed,
    /// 额外奖励
    Bonus,
    /// 惩罚扣除
    Penalty,
    /// 更正（作为新流水记录，从不修改历史）
    Adjustment,
}

impl TransactionType {
    /// 计入 totalPointsEarned 的入账类型
    pub fn is_credit(&self) -> bool {
        matches!(self, Self::Earned | Self::Bonus)
    }

    /// 金额固定为负的扣减类型
    pub fn is_debit(&self) -> bool {
        matches!(self, Self::Redeemed | Self::Penalty)
    }

    /// 检查金额符号是否与类型匹配
    pub fn accepts_amount(&self, amount: i64) -> bool {
        if self.is_credit() {
            amount > 0
        } else if self.is_debit() {
            amount < 0
        } else {
            amount != 0
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earned => "earned",
            Self::Redeemed => "redeemed",
            Self::Bonus => "bonus",
            Self::Penalty => "penalty",
            Self::Adjustment => "adjustment",
        }
    }
}

/// 流水关联类型
///
/// 标识积分变动的触发来源，用于追溯和审计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ReferenceType {
    /// 任务完成
    Task,
    /// 奖励兑换
    RewardRedemption,
    /// 家长手动操作
    Manual,
    /// 系统操作
    #[default]
    System,
}

/// 兑换状态
///
/// 生命周期：pending -> approved -> fulfilled，pending/approved 可取消
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum RedemptionStatus {
    /// 待家长审批
    #[default]
    Pending,
    /// 已审批
    Approved,
    /// 已兑现
    Fulfilled,
    /// 已取消，不占用任何上限
    Cancelled,
}

impl RedemptionStatus {
    /// 是否计入兑换上限
    pub fn counts_against_cap(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// 检查状态流转是否合法
    pub fn can_transition_to(&self, next: RedemptionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Approved, Self::Fulfilled)
                | (Self::Pending, Self::Cancelled)
                | (Self::Approved, Self::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Fulfilled => "fulfilled",
            Self::Cancelled => "cancelled",
        }
    }
}

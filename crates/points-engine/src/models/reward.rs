//! 奖励与兑换相关实体定义
//!
//! 包含奖励定义、兑换记录、上限检查结果和展示用的上限数据

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::RedemptionStatus;
use super::ledger::LedgerEntry;

/// 奖励定义
///
/// 上限与过期时间均为可选：None 表示不限，Some(0) 表示上限为零
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: i64,
    pub name: String,
    /// 兑换所需积分
    pub points_cost: i64,
    #[sqlx(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// 全家庭兑换总次数上限
    #[sqlx(default)]
    pub max_redemptions_total: Option<i64>,
    /// 每个孩子兑换次数上限
    #[sqlx(default)]
    pub max_redemptions_per_child: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reward {
    /// 检查奖励是否已过期（到期时刻即视为过期）
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }

    /// 检查全家庭上限是否已满
    pub fn is_household_cap_reached(&self, total_used: i64) -> bool {
        self.max_redemptions_total.is_some_and(|cap| total_used >= cap)
    }

    /// 检查孩子个人上限是否已满
    pub fn is_child_cap_reached(&self, child_used: i64) -> bool {
        self.max_redemptions_per_child
            .is_some_and(|cap| child_used >= cap)
    }
}

/// 兑换记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RewardRedemption {
    pub id: i64,
    pub reward_id: i64,
    pub child_id: String,
    pub status: RedemptionStatus,
    /// 兑换时实际扣除的积分
    pub points_spent: i64,
    /// 支付本次兑换的扣减流水
    #[sqlx(default)]
    pub ledger_entry_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 兑换占用情况（仅统计非取消状态）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionUsage {
    pub total_used: i64,
    /// 未指定孩子时为 None
    pub child_used: Option<i64>,
}

/// 兑换拒绝原因
///
/// 按闸门顺序排列：过期 -> 全家庭上限 -> 个人上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapViolation {
    Expired,
    HouseholdCapReached,
    ChildCapReached,
}

impl CapViolation {
    /// 展示给用户的原因文案
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Expired => "This reward has expired.",
            Self::HouseholdCapReached => "This reward has been fully claimed by the household.",
            Self::ChildCapReached => {
                "You have already claimed this reward the maximum number of times."
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Expired => "REWARD_EXPIRED",
            Self::HouseholdCapReached => "REWARD_SOLD_OUT",
            Self::ChildCapReached => "CHILD_LIMIT_REACHED",
        }
    }

    /// 指标标签
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::HouseholdCapReached => "sold_out",
            Self::ChildCapReached => "child_limit",
        }
    }

    /// 均为冲突语义
    pub fn status_code(&self) -> u16 {
        409
    }
}

impl std::fmt::Display for CapViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// 上限检查结果（对外接口形态）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapCheckResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl CapCheckResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            status_code: None,
        }
    }

    pub fn rejected(violation: CapViolation) -> Self {
        Self {
            allowed: false,
            reason: Some(violation.reason().to_string()),
            status_code: Some(violation.status_code()),
        }
    }
}

impl From<std::result::Result<(), CapViolation>> for CapCheckResult {
    fn from(decision: std::result::Result<(), CapViolation>) -> Self {
        match decision {
            Ok(()) => Self::allowed(),
            Err(violation) => Self::rejected(violation),
        }
    }
}

/// 奖励上限展示数据
///
/// 仅用于列表/详情页提示，不参与兑换判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardCapData {
    pub total_redemptions_used: i64,
    pub remaining_total: Option<i64>,
    pub remaining_for_child: Option<i64>,
    pub is_expired: bool,
    pub is_sold_out: bool,
}

/// 兑换凭据：兑换记录 + 对应的扣减流水
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionReceipt {
    pub redemption: RewardRedemption,
    pub ledger_entry: LedgerEntry,
}

/// 兑换状态流转结果
///
/// 取消并退款时携带退款流水
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionTransition {
    pub redemption: RewardRedemption,
    pub refund_entry: Option<LedgerEntry>,
}

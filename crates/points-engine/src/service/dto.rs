//! 服务层数据传输对象
//!
//! 请求 DTO 使用 validator 做字段校验，响应 DTO 聚合领域模型供上层直接序列化

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::leveling::LevelProgress;
use crate::models::{
    ChildAccount, LedgerEntry, PointsBreakdown, Reward, RewardCapData, RewardRedemption,
};
use crate::streak::{StreakState, TaskCompletion};

/// 任务完成请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskRequest {
    #[validate(length(min = 1, max = 64, message = "child_id 长度必须在1-64个字符之间"))]
    pub child_id: String,
    #[validate(length(min = 1, max = 64, message = "task_id 长度必须在1-64个字符之间"))]
    pub task_id: String,
    /// 任务基础积分
    #[validate(range(min = 1, max = 1000000, message = "基础积分必须在1-1000000之间"))]
    pub base_points: i64,
    pub completed_at: DateTime<Utc>,
    /// 截止时间，用于计算提前完成奖励
    pub due_at: Option<DateTime<Utc>>,
    /// 家庭自定义的连续打卡宽限期（小时），未设置时使用引擎配置
    #[serde(default)]
    #[validate(range(max = 24, message = "宽限期不能超过24小时"))]
    pub grace_period_hours: Option<u32>,
}

impl CompleteTaskRequest {
    pub fn new(
        child_id: impl Into<String>,
        task_id: impl Into<String>,
        base_points: i64,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            child_id: child_id.into(),
            task_id: task_id.into(),
            base_points,
            completed_at,
            due_at: None,
            grace_period_hours: None,
        }
    }

    pub fn with_due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    pub fn with_grace_period_hours(mut self, hours: u32) -> Self {
        self.grace_period_hours = Some(hours);
        self
    }

    pub fn completion(&self) -> TaskCompletion {
        TaskCompletion {
            base_points: self.base_points,
            completed_at: self.completed_at,
            due_at: self.due_at,
        }
    }
}

/// 任务完成结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletionResult {
    pub entry: LedgerEntry,
    pub breakdown: PointsBreakdown,
    pub points_awarded: i64,
    pub xp_gained: u128,
    pub level: LevelProgress,
    pub leveled_up: bool,
    pub streak: StreakState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_paid: Option<u32>,
}

/// 奖励兑换请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRewardRequest {
    #[validate(length(min = 1, max = 64, message = "child_id 长度必须在1-64个字符之间"))]
    pub child_id: String,
    #[validate(range(min = 1, message = "reward_id 必须为正数"))]
    pub reward_id: i64,
}

impl RedeemRewardRequest {
    pub fn new(child_id: impl Into<String>, reward_id: i64) -> Self {
        Self {
            child_id: child_id.into(),
            reward_id,
        }
    }
}

/// 账户概览
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub account: ChildAccount,
    pub level: LevelProgress,
    pub recent_entries: Vec<LedgerEntry>,
}

/// 账本完整性审计结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub child_id: String,
    pub entry_count: usize,
    pub stored_balance: i64,
    pub replayed_balance: i64,
}

/// 带上限展示数据的奖励
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardWithCapData {
    #[serde(flatten)]
    pub reward: Reward,
    pub cap_data: RewardCapData,
}

/// 孩子的兑换历史
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionHistory {
    pub child_id: String,
    pub redemptions: Vec<RewardRedemption>,
}

//! 连续打卡与奖励加成计算
//!
//! 全部为纯函数：输入当前连续打卡状态与任务完成时间，输出新的打卡状态
//! 和本次任务的积分构成。结果由账本以 `earned` 流水的 breakdown 记录。

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PointsBreakdown;

/// 连续打卡加成上限（250%）
pub const MAX_STREAK_MULTIPLIER: f64 = 2.5;
/// 每连续一天增加的加成比例
pub const STREAK_MULTIPLIER_STEP: f64 = 0.05;
/// 里程碑天数
pub const MILESTONES: [u32; 6] = [3, 7, 14, 30, 60, 100];
/// 里程碑奖励：每个连续天数 5 分
pub const MILESTONE_POINTS_PER_DAY: i64 = 5;
/// 默认宽限期
pub const DEFAULT_GRACE_PERIOD_HOURS: i64 = 4;

pub const BREAKDOWN_BASE: &str = "base";
pub const BREAKDOWN_STREAK: &str = "streak";
pub const BREAKDOWN_EARLY: &str = "early";
pub const BREAKDOWN_MILESTONE: &str = "milestone";

/// 连续打卡状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakState {
    pub current_days: u32,
    pub longest_days: u32,
    pub last_date: Option<NaiveDate>,
    /// 本轮已发放的最高里程碑，0 表示未发放
    pub milestone_watermark: u32,
}

/// 一次任务完成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub base_points: i64,
    pub completed_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
}

/// 任务奖励计算结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAward {
    pub streak: StreakState,
    pub breakdown: PointsBreakdown,
    pub total_points: i64,
    pub xp_gained: u128,
    pub milestone_paid: Option<u32>,
}

/// 连续打卡加成比例：min(天数 * 0.05, 2.5)
pub fn streak_multiplier(streak_days: u32) -> f64 {
    (streak_days as f64 * STREAK_MULTIPLIER_STEP).min(MAX_STREAK_MULTIPLIER)
}

pub fn streak_bonus(base_points: i64, streak_days: u32) -> i64 {
    (base_points as f64 * streak_multiplier(streak_days)).floor() as i64
}

/// 提前完成加成百分比，只取最高档
pub fn early_bonus_percent(hours_before_due: f64) -> i64 {
    match hours_before_due {
        h if h >= 48.0 => 25,
        h if h >= 24.0 => 15,
        h if h >= 12.0 => 10,
        h if h >= 6.0 => 5,
        _ => 0,
    }
}

pub fn early_bonus(
    base_points: i64,
    completed_at: DateTime<Utc>,
    due_at: Option<DateTime<Utc>>,
) -> i64 {
    let Some(due_at) = due_at else {
        return 0;
    };
    let hours = (due_at - completed_at).num_seconds() as f64 / 3600.0;
    base_points * early_bonus_percent(hours) / 100
}

/// 本次连续天数新跨越的最高里程碑
///
/// 只返回高于水位线且不超过当前天数的里程碑
pub fn milestone_crossed(watermark: u32, streak_days: u32) -> Option<u32> {
    MILESTONES
        .iter()
        .rev()
        .copied()
        .find(|m| *m > watermark && *m <= streak_days)
}

pub fn milestone_bonus(streak_days: u32) -> i64 {
    MILESTONE_POINTS_PER_DAY * streak_days as i64
}

/// 完成时间所属的打卡日
///
/// 先扣除宽限期再取 UTC 日期，凌晨宽限期内完成的任务计入前一天
pub fn effective_day(completed_at: DateTime<Utc>, grace: Duration) -> NaiveDate {
    (completed_at - grace).date_naive()
}

/// 推进连续打卡状态
///
/// - 同一打卡日：不变
/// - 下一个打卡日：+1
/// - 早于上次打卡日（补录）：不变
/// - 其余情况：重置为 1，同时重置里程碑水位线
pub fn advance_streak(state: &StreakState, completed_at: DateTime<Utc>, grace: Duration) -> StreakState {
    let day = effective_day(completed_at, grace);

    let (current_days, last_date, watermark) = match state.last_date {
        Some(last) if day <= last => return *state,
        Some(last) if last.succ_opt() == Some(day) => {
            (state.current_days + 1, day, state.milestone_watermark)
        }
        _ => (1, day, 0),
    };

    StreakState {
        current_days,
        longest_days: state.longest_days.max(current_days),
        last_date: Some(last_date),
        milestone_watermark: watermark,
    }
}

/// 计算一次任务完成的完整奖励
pub fn compute_task_award(state: &StreakState, completion: &TaskCompletion, grace: Duration) -> TaskAward {
    let mut streak = advance_streak(state, completion.completed_at, grace);
    let base = completion.base_points;

    let mut breakdown = PointsBreakdown::new();
    breakdown.insert(BREAKDOWN_BASE.to_string(), base);

    let streak_points = streak_bonus(base, streak.current_days);
    if streak_points > 0 {
        breakdown.insert(BREAKDOWN_STREAK.to_string(), streak_points);
    }

    let early_points = early_bonus(base, completion.completed_at, completion.due_at);
    if early_points > 0 {
        breakdown.insert(BREAKDOWN_EARLY.to_string(), early_points);
    }

    let milestone_paid = milestone_crossed(streak.milestone_watermark, streak.current_days);
    if let Some(milestone) = milestone_paid {
        breakdown.insert(
            BREAKDOWN_MILESTONE.to_string(),
            milestone_bonus(streak.current_days),
        );
        streak.milestone_watermark = milestone;
    }

    let total_points: i64 = breakdown.values().sum();

    TaskAward {
        streak,
        breakdown,
        total_points,
        xp_gained: total_points.max(0) as u128,
        milestone_paid,
    }
}

//! 孩子积分账户
//!
//! 账户只通过账本追加修改；余额是最后一条流水 balance_after 的镜像

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::leveling::{self, LevelProgress};
use crate::streak::StreakState;

/// 孩子积分账户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChildAccount {
    pub child_id: String,
    /// 当前余额，等于最新流水的 balance_after
    pub points_balance: i64,
    /// 累计获得积分（单调递增）
    pub total_points_earned: i64,
    /// 等级 1..=100
    pub level: i32,
    /// 当前等级内的经验值
    pub experience_points: i64,
    pub current_streak_days: i32,
    pub longest_streak_days: i32,
    #[sqlx(default)]
    pub last_streak_date: Option<NaiveDate>,
    /// 本轮连续打卡中已发放的最高里程碑，0 表示尚未发放
    pub last_milestone_paid: i32,
    /// 每次追加流水递增，用于进度更新的乐观校验
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChildAccount {
    /// 首次入账前的空账户
    pub fn new(child_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            child_id: child_id.into(),
            points_balance: 0,
            total_points_earned: 0,
            level: 1,
            experience_points: 0,
            current_streak_days: 0,
            longest_streak_days: 0,
            last_streak_date: None,
            last_milestone_paid: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn streak_state(&self) -> StreakState {
        StreakState {
            current_days: self.current_streak_days.max(0) as u32,
            longest_days: self.longest_streak_days.max(0) as u32,
            last_date: self.last_streak_date,
            milestone_watermark: self.last_milestone_paid.max(0) as u32,
        }
    }

    /// 当前等级进度（用于展示）
    pub fn level_progress(&self) -> LevelProgress {
        let total = leveling::total_xp_for_level(self.level.max(1) as u32)
            + self.experience_points.max(0) as u128;
        leveling::level_from_xp(total)
    }

    /// 应用进度更新（仅在持有账户锁时调用）
    pub fn apply_progress(&mut self, progress: &ProgressUpdate) {
        self.level = progress.level;
        self.experience_points = progress.experience_points;
        self.current_streak_days = progress.current_streak_days;
        self.longest_streak_days = progress.longest_streak_days;
        self.last_streak_date = progress.last_streak_date;
        self.last_milestone_paid = progress.last_milestone_paid;
    }
}

/// 与流水一同原子写入的账户进度
///
/// 由任务完成流程基于某个版本的账户快照计算；
/// 写入时版本不一致说明快照已过期，需要重新计算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub expected_version: i64,
    pub level: i32,
    pub experience_points: i64,
    pub current_streak_days: i32,
    pub longest_streak_days: i32,
    pub last_streak_date: Option<NaiveDate>,
    pub last_milestone_paid: i32,
}

impl ProgressUpdate {
    pub fn new(expected_version: i64, level: &LevelProgress, streak: &StreakState) -> Self {
        Self {
            expected_version,
            level: level.level as i32,
            experience_points: i64::try_from(level.current_xp).unwrap_or(i64::MAX),
            current_streak_days: streak.current_days as i32,
            longest_streak_days: streak.longest_days as i32,
            last_streak_date: streak.last_date,
            last_milestone_paid: streak.milestone_watermark as i32,
        }
    }
}

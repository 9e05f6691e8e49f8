//! 奖励上限展示数据
//!
//! 只读投影，结果用于奖励列表/详情页的提示，不参与兑换授权

use chrono::{DateTime, Utc};

use crate::models::{RedemptionUsage, Reward, RewardCapData};

/// 基于兑换占用情况计算展示字段
///
/// 剩余次数在不限量时为 None；未指定孩子时 remaining_for_child 也为 None
pub fn compute_cap_data(reward: &Reward, usage: &RedemptionUsage, now: DateTime<Utc>) -> RewardCapData {
    let remaining_total = reward
        .max_redemptions_total
        .map(|cap| (cap - usage.total_used).max(0));

    let remaining_for_child = match (reward.max_redemptions_per_child, usage.child_used) {
        (Some(cap), Some(used)) => Some((cap - used).max(0)),
        _ => None,
    };

    RewardCapData {
        total_redemptions_used: usage.total_used,
        remaining_total,
        remaining_for_child,
        is_expired: reward.is_expired(now),
        is_sold_out: reward.is_household_cap_reached(usage.total_used),
    }
}

//! 兑换闸门
//!
//! 按固定顺序评估三道闸门，第一道失败的闸门决定返回给用户的原因：
//! 过期 -> 全家庭上限 -> 个人上限。
//!
//! 本模块只做判定，不读写存储；计数与插入的原子性由仓储的
//! `try_reserve_slot` 保证。

use chrono::{DateTime, Utc};

use crate::models::{CapCheckResult, CapViolation, RedemptionUsage, Reward};

/// 评估兑换闸门
///
/// `usage.child_used` 为 None 时跳过个人上限闸门
pub fn evaluate_gates(
    reward: &Reward,
    usage: &RedemptionUsage,
    now: DateTime<Utc>,
) -> Result<(), CapViolation> {
    if reward.is_expired(now) {
        return Err(CapViolation::Expired);
    }

    if reward.is_household_cap_reached(usage.total_used) {
        return Err(CapViolation::HouseholdCapReached);
    }

    if let Some(child_used) = usage.child_used {
        if reward.is_child_cap_reached(child_used) {
            return Err(CapViolation::ChildCapReached);
        }
    }

    Ok(())
}

/// 对外的判定结果形态
pub fn check_redemption_caps(
    reward: &Reward,
    usage: &RedemptionUsage,
    now: DateTime<Utc>,
) -> CapCheckResult {
    evaluate_gates(reward, usage, now).into()
}

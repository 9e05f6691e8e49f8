//! 等级计算
//!
//! 经验值与等级之间的纯函数映射，无状态、无副作用，可在任意账本计算中直接调用。
//!
//! 升级曲线：从 `level` 升到 `level + 1` 需要 `floor(100 * 1.5^(level - 1))` 经验。
//! 第 100 级所需经验超出 64 位整数范围，因此经验值统一使用 `u128`。

use serde::{Deserialize, Serialize};

/// 1 级升 2 级所需经验
pub const BASE_XP: f64 = 100.0;
/// 每级经验增长倍数
pub const GROWTH_FACTOR: f64 = 1.5;
/// 等级上限
pub const MAX_LEVEL: u32 = 100;

/// 等级进度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub level: u32,
    /// 当前等级内已积累的经验
    pub current_xp: u128,
    /// 当前等级升到下一级所需经验
    pub next_level_xp: u128,
}

/// 经验变化结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpGain {
    pub previous_level: u32,
    pub progress: LevelProgress,
}

impl XpGain {
    pub fn leveled_up(&self) -> bool {
        self.progress.level > self.previous_level
    }

    pub fn levels_gained(&self) -> u32 {
        self.progress.level.saturating_sub(self.previous_level)
    }
}

/// 从 `level` 升到 `level + 1` 所需经验
///
/// 按双精度浮点计算后向下取整；level 小于 1 时按 1 处理
pub fn xp_for_level(level: u32) -> u128 {
    let exponent = level.max(1) - 1;
    (BASE_XP * GROWTH_FACTOR.powf(exponent as f64)).floor() as u128
}

/// 到达 `level` 所需的累计经验
///
/// 即 `xp_for_level(1) + ... + xp_for_level(level - 1)`，`total_xp_for_level(1) == 0`
pub fn total_xp_for_level(level: u32) -> u128 {
    (1..level.min(MAX_LEVEL + 1)).map(xp_for_level).sum()
}

/// 由累计经验推导等级
///
/// 从 1 级开始逐级扣减，直到剩余经验不足以升级；等级封顶于 MAX_LEVEL，
/// 封顶后剩余经验全部保留在 current_xp 中
pub fn level_from_xp(total_xp: u128) -> LevelProgress {
    let mut level = 1;
    let mut remaining = total_xp;

    while level < MAX_LEVEL {
        let needed = xp_for_level(level);
        if remaining < needed {
            break;
        }
        remaining -= needed;
        level += 1;
    }

    LevelProgress {
        level,
        current_xp: remaining,
        next_level_xp: xp_for_level(level),
    }
}

/// 在已存储的 (等级, 等级内经验) 上累加经验
pub fn apply_xp(level: u32, experience_points: u128, delta: u128) -> XpGain {
    let previous_level = level.clamp(1, MAX_LEVEL);
    let total = total_xp_for_level(previous_level)
        .saturating_add(experience_points)
        .saturating_add(delta);

    XpGain {
        previous_level,
        progress: level_from_xp(total),
    }
}

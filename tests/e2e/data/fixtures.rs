//! 预定义的测试数据

use chrono::{DateTime, Duration, TimeZone, Utc};
use points_engine::Reward;

/// 家庭成员
pub const SIBLINGS: [&str; 3] = ["anna", "ben", "cleo"];

/// 打卡周的第 `day` 天（从 1 开始）的 `hour` 点
pub fn week_day(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, day, hour, 0, 0).unwrap()
}

/// 奖励构建器
#[derive(Debug, Clone)]
pub struct RewardFixture {
    name: String,
    points_cost: i64,
    expires_at: Option<DateTime<Utc>>,
    max_total: Option<i64>,
    max_per_child: Option<i64>,
}

impl RewardFixture {
    pub fn new(name: &str, points_cost: i64) -> Self {
        Self {
            name: name.to_string(),
            points_cost,
            expires_at: None,
            max_total: None,
            max_per_child: None,
        }
    }

    /// 周末家庭电影夜：全家限 2 次
    pub fn movie_night() -> Self {
        Self::new("Movie night", 30).with_total_cap(2)
    }

    /// 冰淇淋：每人限 1 次
    pub fn ice_cream() -> Self {
        Self::new("Ice cream", 20).with_child_cap(1)
    }

    /// 已过期的限时奖励
    pub fn expired_treat() -> Self {
        Self::new("Holiday treat", 5).expiring_in(Duration::hours(-1))
    }

    pub fn with_total_cap(mut self, cap: i64) -> Self {
        self.max_total = Some(cap);
        self
    }

    pub fn with_child_cap(mut self, cap: i64) -> Self {
        self.max_per_child = Some(cap);
        self
    }

    pub fn expiring_in(mut self, offset: Duration) -> Self {
        self.expires_at = Some(Utc::now() + offset);
        self
    }

    pub fn build(self) -> Reward {
        let now = Utc::now();
        Reward {
            id: 0,
            name: self.name,
            points_cost: self.points_cost,
            expires_at: self.expires_at,
            max_redemptions_total: self.max_total,
            max_redemptions_per_child: self.max_per_child,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

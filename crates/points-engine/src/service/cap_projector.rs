//! 奖励上限展示数据服务
//!
//! 为奖励列表/详情页提供剩余名额与售罄/过期标记。结果只用于展示，
//! 兑换是否允许始终以 `RedemptionService::redeem` 事务内的判定为准。

use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use tracing::instrument;

use crate::error::{PointsError, Result};
use crate::models::{Reward, RewardCapData};
use crate::projector;
use crate::repository::RedemptionRepositoryTrait;
use crate::service::dto::RewardWithCapData;

pub struct CapDataService<R>
where
    R: RedemptionRepositoryTrait,
{
    redemption_repo: Arc<R>,
}

impl<R> CapDataService<R>
where
    R: RedemptionRepositoryTrait,
{
    pub fn new(redemption_repo: Arc<R>) -> Self {
        Self { redemption_repo }
    }

    /// 计算单个奖励的展示数据
    ///
    /// child_id 为空时不计算个人剩余次数
    #[instrument(skip(self, reward))]
    pub async fn get_reward_cap_data(
        &self,
        reward_id: i64,
        child_id: Option<&str>,
        reward: &Reward,
    ) -> Result<RewardCapData> {
        let usage = self
            .redemption_repo
            .count_redemptions(reward_id, child_id.map(str::to_string))
            .await?;

        Ok(projector::compute_cap_data(reward, &usage, Utc::now()))
    }

    /// 按 ID 加载奖励并附带展示数据
    pub async fn get_reward_with_cap_data(
        &self,
        reward_id: i64,
        child_id: Option<&str>,
    ) -> Result<RewardWithCapData> {
        let reward = self
            .redemption_repo
            .get_reward(reward_id)
            .await?
            .ok_or(PointsError::RewardNotFound(reward_id))?;

        let cap_data = self.get_reward_cap_data(reward_id, child_id, &reward).await?;
        Ok(RewardWithCapData { reward, cap_data })
    }

    /// 批量计算奖励列表的展示数据，保持输入顺序
    pub async fn project_many(
        &self,
        rewards: Vec<Reward>,
        child_id: Option<&str>,
    ) -> Result<Vec<RewardWithCapData>> {
        try_join_all(rewards.into_iter().map(|reward| async move {
            let cap_data = self.get_reward_cap_data(reward.id, child_id, &reward).await?;
            Ok::<_, PointsError>(RewardWithCapData { reward, cap_data })
        }))
        .await
    }
}

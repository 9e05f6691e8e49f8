//! 家庭打卡周测试套件
//!
//! 三个孩子一周内完成任务、积累积分，再争抢限量奖励。

use crate::data::*;
use crate::setup::TestEnvironment;
use points_engine::dto::CompleteTaskRequest;
use points_engine::{CapViolation, PointsError, RedemptionStatus};

/// 按天打卡，每天 18:00 完成一个 10 分任务
async fn check_in(env: &TestEnvironment, child_id: &str, days: &[u32]) -> i64 {
    let mut total = 0;
    for day in days {
        let result = env
            .complete(CompleteTaskRequest::new(
                child_id,
                format!("chores-{day}"),
                10,
                week_day(*day, 18),
            ))
            .await
            .unwrap();
        total += result.points_awarded;
    }
    total
}

fn cap_violation(err: &anyhow::Error) -> Option<CapViolation> {
    match err.downcast_ref::<PointsError>() {
        Some(PointsError::CapViolation(violation)) => Some(*violation),
        _ => None,
    }
}

#[cfg(test)]
mod weekly_flow_tests {
    use super::*;

    /// 一周打卡收益
    ///
    /// anna 连续 7 天，ben 第 4 天断签，cleo 只坚持 3 天
    #[tokio::test]
    async fn test_week_of_chores() {
        let env = TestEnvironment::setup();

        // 10 + 11 + 26(里程碑3) + 12 + 12 + 13 + 48(里程碑7)
        assert_eq!(check_in(&env, SIBLINGS[0], &[1, 2, 3, 4, 5, 6, 7]).await, 132);
        // 断签后重新累计，里程碑 3 再次发放
        assert_eq!(check_in(&env, SIBLINGS[1], &[1, 2, 3, 5, 6, 7]).await, 94);
        assert_eq!(check_in(&env, SIBLINGS[2], &[1, 2, 3]).await, 47);

        let anna = env.ledger.get_account(SIBLINGS[0]).await.unwrap();
        assert_eq!(anna.points_balance, 132);
        assert_eq!(anna.level, 2);
        assert_eq!(anna.experience_points, 32);
        assert_eq!(anna.last_milestone_paid, 7);
        assert_eq!(anna.longest_streak_days, 7);

        let ben = env.ledger.get_account(SIBLINGS[1]).await.unwrap();
        assert_eq!(ben.current_streak_days, 3);
        assert_eq!(ben.longest_streak_days, 3);
        assert_eq!(ben.level, 1);

        assert_eq!(env.audit_all().await.unwrap(), 3);
    }

    /// 限量奖励争抢
    ///
    /// 电影夜全家限 2 次，三人同时兑换只有两人成功；
    /// 取消一次兑换后第三人可以兑换
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_siblings_race_for_movie_night() {
        let env = TestEnvironment::setup();
        for child in SIBLINGS {
            check_in(&env, child, &[1, 2, 3]).await;
        }
        let movie = env.add_reward(RewardFixture::movie_night());

        let attempts: Vec<_> = SIBLINGS
            .iter()
            .map(|child| {
                let redemption = env.redemption.clone();
                let child = child.to_string();
                let reward_id = movie.id;
                tokio::spawn(async move {
                    let result = redemption
                        .redeem(points_engine::dto::RedeemRewardRequest::new(
                            child.as_str(),
                            reward_id,
                        ))
                        .await;
                    (child, result)
                })
            })
            .collect();

        let mut winners = Vec::new();
        let mut losers = Vec::new();
        for attempt in attempts {
            let (child, result) = attempt.await.unwrap();
            match result {
                Ok(receipt) => winners.push((child, receipt)),
                Err(PointsError::CapViolation(CapViolation::HouseholdCapReached)) => {
                    losers.push(child)
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(winners.len(), 2);
        assert_eq!(losers.len(), 1);

        let loser = &losers[0];
        assert_eq!(env.ledger.get_balance(loser).await.unwrap(), 47);

        let listing = env
            .cap_data
            .get_reward_with_cap_data(movie.id, Some(loser.as_str()))
            .await
            .unwrap();
        assert!(listing.cap_data.is_sold_out);
        assert_eq!(listing.cap_data.remaining_total, Some(0));

        // 取消一位赢家的兑换并退款，名额释放给第三人
        let (winner, receipt) = &winners[0];
        env.redemption
            .cancel(receipt.redemption.id, true)
            .await
            .unwrap();
        assert_eq!(env.ledger.get_balance(winner).await.unwrap(), 47);

        env.redeem(loser, movie.id).await.unwrap();
        assert_eq!(env.ledger.get_balance(loser).await.unwrap(), 17);
        assert_eq!(env.audit_all().await.unwrap(), 3);
    }

    /// 个人限兑与过期奖励
    #[tokio::test]
    async fn test_child_cap_and_expired_reward() {
        let env = TestEnvironment::setup();
        check_in(&env, SIBLINGS[0], &[1, 2, 3]).await;
        check_in(&env, SIBLINGS[1], &[1, 2, 3]).await;

        let ice_cream = env.add_reward(RewardFixture::ice_cream());
        let treat = env.add_reward(RewardFixture::expired_treat());

        env.redeem(SIBLINGS[0], ice_cream.id).await.unwrap();
        let err = env.redeem(SIBLINGS[0], ice_cream.id).await.unwrap_err();
        assert_eq!(cap_violation(&err), Some(CapViolation::ChildCapReached));
        assert_eq!(
            err.to_string(),
            "You have already claimed this reward the maximum number of times."
        );

        // 其他孩子不受影响
        env.redeem(SIBLINGS[1], ice_cream.id).await.unwrap();

        let err = env.redeem(SIBLINGS[1], treat.id).await.unwrap_err();
        assert_eq!(cap_violation(&err), Some(CapViolation::Expired));
    }

    /// 审批到兑现的完整生命周期
    #[tokio::test]
    async fn test_parent_approves_and_fulfills() {
        let env = TestEnvironment::setup();
        check_in(&env, SIBLINGS[2], &[1, 2, 3]).await;
        let ice_cream = env.add_reward(RewardFixture::ice_cream());

        let receipt = env.redeem(SIBLINGS[2], ice_cream.id).await.unwrap();
        let approved = env.redemption.approve(receipt.redemption.id).await.unwrap();
        assert_eq!(approved.status, RedemptionStatus::Approved);
        let fulfilled = env.redemption.fulfill(receipt.redemption.id).await.unwrap();
        assert_eq!(fulfilled.status, RedemptionStatus::Fulfilled);

        let history = env
            .redemption
            .list_child_redemptions(SIBLINGS[2], 10)
            .await
            .unwrap();
        assert_eq!(history.redemptions.len(), 1);
        assert_eq!(history.redemptions[0].status, RedemptionStatus::Fulfilled);
        assert_eq!(env.ledger.get_balance(SIBLINGS[2]).await.unwrap(), 27);
    }
}

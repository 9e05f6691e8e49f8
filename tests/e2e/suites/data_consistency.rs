//! 数据一致性测试套件
//!
//! 在混合并发负载下验证账本回放与兑换上限始终成立。

use crate::data::*;
use crate::setup::TestEnvironment;
use points_engine::dto::{CompleteTaskRequest, RedeemRewardRequest};
use points_engine::{LedgerReference, NewLedgerEntry, PointsError, TransactionType};

#[cfg(test)]
mod consistency_tests {
    use super::*;

    /// 任务入账、扣分与兑换交错执行后，每个账户的回放余额都与存储余额一致，
    /// 且限量奖励没有超发
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mixed_workload_keeps_invariants() {
        let env = TestEnvironment::setup();
        let movie = env.add_reward(RewardFixture::movie_night());
        let ice_cream = env.add_reward(RewardFixture::ice_cream());

        let mut handles = Vec::new();
        for child in SIBLINGS {
            for day in 1..=5u32 {
                let ledger = env.ledger.clone();
                handles.push(tokio::spawn(async move {
                    ledger
                        .complete_task(CompleteTaskRequest::new(
                            child,
                            format!("task-{day}"),
                            15,
                            week_day(day, 9),
                        ))
                        .await
                        .map(|_| ())
                }));
            }

            let ledger = env.ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .append_entry(
                        NewLedgerEntry::new(
                            child,
                            TransactionType::Penalty,
                            -1,
                            LedgerReference::manual(None),
                        )
                        .with_description("忘记整理房间"),
                    )
                    .await
                    .map(|_| ())
            }));

            for reward_id in [movie.id, ice_cream.id, ice_cream.id] {
                let redemption = env.redemption.clone();
                handles.push(tokio::spawn(async move {
                    redemption
                        .redeem(RedeemRewardRequest::new(child, reward_id))
                        .await
                        .map(|_| ())
                }));
            }
        }

        for handle in handles {
            match handle.await.unwrap() {
                Ok(())
                | Err(PointsError::CapViolation(_))
                | Err(PointsError::InsufficientBalance { .. }) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(env.audit_all().await.unwrap(), SIBLINGS.len());

        let movie_data = env
            .cap_data
            .get_reward_with_cap_data(movie.id, None)
            .await
            .unwrap();
        assert!(movie_data.cap_data.total_redemptions_used <= 2);

        for child in SIBLINGS {
            let ice = env
                .cap_data
                .get_reward_with_cap_data(ice_cream.id, Some(child))
                .await
                .unwrap();
            assert!(ice.cap_data.remaining_for_child.unwrap() >= 0);

            let entries = env.ledger.list_entries(child).await.unwrap();
            let sum: i64 = entries.iter().map(|e| e.points_amount).sum();
            assert_eq!(env.ledger.get_balance(child).await.unwrap(), sum);
            assert!(entries.iter().all(|e| e.balance_after >= 0));

            let history = env.redemption.list_child_redemptions(child, 50).await.unwrap();
            let ice_count = history
                .redemptions
                .iter()
                .filter(|r| r.reward_id == ice_cream.id)
                .count();
            assert!(ice_count <= 1);
        }
    }
}

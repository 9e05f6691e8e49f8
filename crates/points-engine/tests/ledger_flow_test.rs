//! 积分账本集成测试
//!
//! 基于内存仓储验证任务入账、余额回放与账本审计的完整流程，无需外部依赖。

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use points_engine::dto::CompleteTaskRequest;
use points_engine::{
    InMemoryPointsStore, LedgerReference, LedgerService, NewLedgerEntry, PointsError,
    TransactionType, replay_entries,
};
use points_shared::config::EngineConfig;

// ==================== 辅助函数 ====================

fn engine_config(max_attempts: u32) -> EngineConfig {
    EngineConfig {
        max_attempts,
        retry_initial_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..Default::default()
    }
}

fn setup() -> (Arc<InMemoryPointsStore>, LedgerService<InMemoryPointsStore>) {
    let store = Arc::new(InMemoryPointsStore::new());
    let service = LedgerService::new(store.clone(), &engine_config(3));
    (store, service)
}

/// 2026 年 3 月某天中午（UTC）
fn noon(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
}

fn credit(child_id: &str, transaction_type: TransactionType, amount: i64) -> NewLedgerEntry {
    NewLedgerEntry::new(child_id, transaction_type, amount, LedgerReference::manual(None))
}

// ==================== 任务入账 ====================

#[tokio::test]
async fn test_streak_bonus_and_milestone_paid_once_per_crossing() {
    let (_, service) = setup();

    let day1 = service
        .complete_task(CompleteTaskRequest::new("mia", "dishes", 10, noon(1)))
        .await
        .unwrap();
    assert_eq!(day1.points_awarded, 10);
    assert_eq!(day1.streak.current_days, 1);
    assert!(day1.milestone_paid.is_none());

    let day2 = service
        .complete_task(CompleteTaskRequest::new("mia", "dishes", 10, noon(2)))
        .await
        .unwrap();
    assert_eq!(day2.points_awarded, 11);
    assert_eq!(day2.breakdown.get("streak"), Some(&1));

    // 第 3 天跨越里程碑 3：10 基础 + 1 连续 + 15 里程碑
    let day3 = service
        .complete_task(CompleteTaskRequest::new("mia", "dishes", 10, noon(3)))
        .await
        .unwrap();
    assert_eq!(day3.milestone_paid, Some(3));
    assert_eq!(day3.breakdown.get("milestone"), Some(&15));
    assert_eq!(day3.points_awarded, 26);
    assert_eq!(day3.entry.balance_after, 47);

    // 同一天再完成一个任务，不再发放里程碑
    let again = service
        .complete_task(CompleteTaskRequest::new("mia", "homework", 10, noon(3)))
        .await
        .unwrap();
    assert!(again.milestone_paid.is_none());
    assert_eq!(again.streak.current_days, 3);
    assert_eq!(again.points_awarded, 11);

    // 断签后重新累计，新的一轮可以再次跨越里程碑 3
    let restart = service
        .complete_task(CompleteTaskRequest::new("mia", "dishes", 10, noon(5)))
        .await
        .unwrap();
    assert_eq!(restart.streak.current_days, 1);
    assert_eq!(restart.streak.longest_days, 3);
    assert_eq!(restart.streak.milestone_watermark, 0);

    service
        .complete_task(CompleteTaskRequest::new("mia", "dishes", 10, noon(6)))
        .await
        .unwrap();
    let second_crossing = service
        .complete_task(CompleteTaskRequest::new("mia", "dishes", 10, noon(7)))
        .await
        .unwrap();
    assert_eq!(second_crossing.milestone_paid, Some(3));

    let account = service.get_account("mia").await.unwrap();
    assert_eq!(account.last_milestone_paid, 3);
    assert_eq!(account.current_streak_days, 3);
    assert_eq!(account.points_balance, account.total_points_earned);
}

#[tokio::test]
async fn test_grace_period_counts_early_morning_as_previous_day() {
    let (_, service) = setup();

    service
        .complete_task(CompleteTaskRequest::new("leo", "reading", 10, noon(1)))
        .await
        .unwrap();

    // 3 月 3 日 02:00 在 4 小时宽限期内，计入 3 月 2 日
    let late = Utc.with_ymd_and_hms(2026, 3, 3, 2, 0, 0).unwrap();
    let result = service
        .complete_task(CompleteTaskRequest::new("leo", "reading", 10, late))
        .await
        .unwrap();
    assert_eq!(result.streak.current_days, 2);

    // 家庭关闭宽限期时，同一时刻计入 3 月 3 日，连续天数仍递增
    let next = service
        .complete_task(
            CompleteTaskRequest::new("leo", "reading", 10, late + Duration::minutes(5))
                .with_grace_period_hours(0),
        )
        .await
        .unwrap();
    assert_eq!(next.streak.current_days, 3);
}

#[tokio::test]
async fn test_early_completion_and_level_up() {
    let (_, service) = setup();

    let early = service
        .complete_task(
            CompleteTaskRequest::new("ava", "project", 20, noon(1))
                .with_due_at(noon(1) + Duration::hours(30)),
        )
        .await
        .unwrap();
    // 20 基础 + 1 连续(5%) + 3 提前(15%)
    assert_eq!(early.breakdown.get("early"), Some(&3));
    assert_eq!(early.points_awarded, 24);
    assert!(!early.leveled_up);

    let big = service
        .complete_task(CompleteTaskRequest::new("ava", "garden", 300, noon(2)))
        .await
        .unwrap();
    // 累计经验 24 + 330 = 354：1 级需 100，2 级需 150，3 级需 225
    assert!(big.leveled_up);
    assert_eq!(big.level.level, 3);
    assert_eq!(big.level.current_xp, 104);
    assert_eq!(big.level.next_level_xp, 225);

    let progress = service.get_level_progress("ava").await.unwrap();
    assert_eq!(progress, big.level);
}

// ==================== 余额与回放 ====================

#[tokio::test]
async fn test_balance_equals_replay_after_mixed_appends() {
    let (_, service) = setup();

    service.append_entry(credit("noah", TransactionType::Earned, 50)).await.unwrap();
    service.append_entry(credit("noah", TransactionType::Bonus, 20)).await.unwrap();
    service.append_entry(credit("noah", TransactionType::Penalty, -30)).await.unwrap();
    service.append_entry(credit("noah", TransactionType::Adjustment, 5)).await.unwrap();

    // 扣减超过余额：拒绝且不留下任何写入
    let err = service
        .append_entry(credit("noah", TransactionType::Penalty, -100))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PointsError::InsufficientBalance {
            required: 100,
            available: 45
        }
    ));

    let entries = service.list_entries("noah").await.unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(replay_entries(&entries), Ok(45));

    let account = service.get_account("noah").await.unwrap();
    assert_eq!(account.points_balance, 45);
    assert_eq!(account.total_points_earned, 70);

    let report = service.verify_integrity("noah").await.unwrap();
    assert_eq!(report.entry_count, 4);
    assert_eq!(report.stored_balance, report.replayed_balance);
}

#[tokio::test]
async fn test_wrong_sign_is_rejected() {
    let (_, service) = setup();

    for entry in [
        credit("zoe", TransactionType::Earned, -5),
        credit("zoe", TransactionType::Penalty, 5),
        credit("zoe", TransactionType::Adjustment, 0),
    ] {
        let err = service.append_entry(entry).await.unwrap_err();
        assert!(matches!(err, PointsError::Validation(_)));
    }
    assert_eq!(service.get_balance("zoe").await.unwrap(), 0);
}

#[tokio::test]
async fn test_extreme_amounts_never_corrupt_balance() {
    let (_, service) = setup();
    service.append_entry(credit("max", TransactionType::Earned, 10)).await.unwrap();

    let err = service
        .append_entry(credit("max", TransactionType::Adjustment, i64::MIN))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PointsError::InsufficientBalance {
            required: i64::MAX,
            available: 10
        }
    ));

    let err = service
        .append_entry(credit("max", TransactionType::Earned, i64::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, PointsError::Validation(_)));

    assert_eq!(service.get_balance("max").await.unwrap(), 10);
    let report = service.verify_integrity("max").await.unwrap();
    assert_eq!(report.entry_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_for_one_child_are_serialized() {
    let (_, service) = setup();
    let service = Arc::new(service);

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .append_entry(credit("eli", TransactionType::Bonus, 2))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let entries = service.list_entries("eli").await.unwrap();
    let mut balances: Vec<i64> = entries.iter().map(|e| e.balance_after).collect();
    balances.sort_unstable();
    assert_eq!(balances, (1..=50).map(|i| i * 2).collect::<Vec<_>>());
    assert_eq!(service.get_balance("eli").await.unwrap(), 100);
    service.verify_integrity("eli").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_task_completions_keep_progress_consistent() {
    let store = Arc::new(InMemoryPointsStore::new());
    let service = Arc::new(LedgerService::new(store, &engine_config(20)));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .complete_task(CompleteTaskRequest::new("ivy", format!("task-{i}"), 10, noon(1)))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let account = service.get_account("ivy").await.unwrap();
    assert_eq!(account.points_balance, 100);
    assert_eq!(account.current_streak_days, 1);
    assert_eq!(account.version, 10);
    // 累计 100 经验恰好升到 2 级
    assert_eq!(account.level, 2);
    assert_eq!(account.experience_points, 0);
    service.verify_integrity("ivy").await.unwrap();
}

// ==================== 查询与审计 ====================

#[tokio::test]
async fn test_recent_entries_are_newest_first() {
    let (_, service) = setup();
    for amount in [1, 2, 3] {
        service
            .append_entry(credit("max", TransactionType::Earned, amount))
            .await
            .unwrap();
    }

    let recent = service.list_recent_entries("max", 2).await.unwrap();
    let amounts: Vec<i64> = recent.iter().map(|e| e.points_amount).collect();
    assert_eq!(amounts, vec![3, 2]);

    assert!(matches!(
        service.list_recent_entries("max", 0).await,
        Err(PointsError::Validation(_))
    ));

    let summary = service.get_account_summary("max", 10).await.unwrap();
    assert_eq!(summary.account.points_balance, 6);
    assert_eq!(summary.recent_entries.len(), 3);
}

#[tokio::test]
async fn test_unknown_child_queries() {
    let (_, service) = setup();
    assert_eq!(service.get_balance("ghost").await.unwrap(), 0);
    assert!(matches!(
        service.get_account("ghost").await,
        Err(PointsError::ChildNotFound(_))
    ));
    assert!(service.list_entries("ghost").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_integrity_audit_detects_tampered_balance() {
    let (store, service) = setup();
    service.append_entry(credit("kai", TransactionType::Earned, 30)).await.unwrap();
    service.verify_integrity("kai").await.unwrap();

    store.overwrite_balance("kai", 31);

    let err = service.verify_integrity("kai").await.unwrap_err();
    assert!(err.is_fatal());
    match err {
        PointsError::IntegrityViolation {
            child_id,
            stored_balance,
            replayed_balance,
        } => {
            assert_eq!(child_id, "kai");
            assert_eq!(stored_balance, 31);
            assert_eq!(replayed_balance, 30);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(service.list_child_ids().await.unwrap(), vec!["kai".to_string()]);
}

//! 可观测性模块集成测试
//!
//! 测试 metrics 记录函数、日志过滤器与统一初始化入口。

// ============================================================================
// 指标记录测试
// ============================================================================

mod metrics_tests {
    use points_shared::observability::metrics::{
        record_concurrency_conflict, record_integrity_violation, record_ledger_append,
        record_redemption, record_task_completion,
    };

    #[test]
    fn test_record_ledger_append() {
        for transaction_type in ["earned", "redeemed", "bonus", "penalty", "adjustment"] {
            record_ledger_append(transaction_type);
        }
    }

    #[test]
    fn test_record_redemption_outcomes() {
        record_redemption("success", 0.012);
        record_redemption("expired", 0.001);
        record_redemption("sold_out", 0.002);
        record_redemption("child_limit", 0.002);
        record_redemption("insufficient_balance", 0.004);
        record_redemption("conflict", 1.5);
        record_redemption("error", 0.0);
    }

    #[test]
    fn test_record_conflicts_and_violations() {
        record_task_completion(false);
        record_task_completion(true);
        record_concurrency_conflict("complete_task");
        record_concurrency_conflict("redeem_reward");
        record_integrity_violation();
    }

    #[test]
    fn test_metrics_with_edge_cases() {
        // 空标签
        record_ledger_append("");
        record_concurrency_conflict("");

        // 极端持续时间
        record_redemption("success", 999.99);
        record_redemption("success", 0.000001);
    }
}

// ============================================================================
// 日志初始化测试
// ============================================================================

mod tracing_tests {
    use points_shared::config::ObservabilityConfig;
    use points_shared::observability::{self, tracing::build_env_filter};

    #[test]
    fn test_env_filter_accepts_directives() {
        let filter = build_env_filter("warn,points_engine::integrity=error");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn test_init_twice_returns_error() {
        let config = ObservabilityConfig {
            log_format: "json".to_string(),
            ..Default::default()
        };
        assert!(config.json_logs());

        // 同一进程内第二次初始化必然失败（第一次可能已被其他测试占用）
        let _ = observability::init(&config);
        assert!(observability::init(&config).is_err());
    }
}

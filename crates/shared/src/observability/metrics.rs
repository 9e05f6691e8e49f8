//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。未安装 recorder 时，
//! 记录函数是空操作。

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::config::ObservabilityConfig;
use crate::error::{InfraError, Result};

/// 初始化 Prometheus 指标导出
///
/// 在指定端口启动内置 HTTP 监听器暴露 `/metrics`，需在 tokio 运行时内调用。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| InfraError::Observability(e.to_string()))?;

    register_common_metrics(&config.service_name);
    info!("Metrics exporter listening on {}", addr);

    Ok(())
}

/// 注册通用指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "ledger_appends_total",
        "Total number of ledger entries appended"
    );
    metrics::describe_counter!(
        "task_completions_total",
        "Total number of task completions credited"
    );
    metrics::describe_counter!(
        "redemptions_total",
        "Total number of redemption attempts by outcome"
    );
    metrics::describe_histogram!(
        "redemption_duration_seconds",
        "Redemption duration in seconds"
    );
    metrics::describe_counter!(
        "concurrency_conflicts_total",
        "Total number of concurrency conflicts observed"
    );
    metrics::describe_counter!(
        "integrity_violations_total",
        "Total number of ledger integrity violations"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录账本追加
#[inline]
pub fn record_ledger_append(transaction_type: &str) {
    metrics::counter!(
        "ledger_appends_total",
        "transaction_type" => transaction_type.to_string()
    )
    .increment(1);
}

/// 记录任务完成入账
#[inline]
pub fn record_task_completion(milestone_paid: bool) {
    metrics::counter!(
        "task_completions_total",
        "milestone_paid" => milestone_paid.to_string()
    )
    .increment(1);
}

/// 记录兑换结果
///
/// outcome: success / expired / sold_out / child_limit / insufficient_balance / conflict / error
#[inline]
pub fn record_redemption(outcome: &str, duration_secs: f64) {
    metrics::counter!("redemptions_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("redemption_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// 记录并发冲突
#[inline]
pub fn record_concurrency_conflict(operation: &str) {
    metrics::counter!(
        "concurrency_conflicts_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// 记录账本完整性异常
#[inline]
pub fn record_integrity_violation() {
    metrics::counter!("integrity_violations_total").increment(1);
}

//! 积分账本审计工具
//!
//! 回放每个孩子的积分流水并与账户余额比对。
//!
//! 用法：`points-audit [child_id...]`，未指定孩子时审计全部账户。
//! 存在任何不一致时以非零状态码退出。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use points_shared::{config::AppConfig, database::Database, observability};
use tracing::{error, info, warn};

use points_engine::{LedgerRepository, LedgerService, PointsError};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // 1. 加载配置：config/default.toml -> 环境配置 -> config/points-audit.toml -> POINTS_ 环境变量
    let config = AppConfig::load("points-audit").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config)?;

    info!(environment = %config.environment, "Starting points-audit...");

    // 2. 数据库连接与迁移
    let migrations_dir =
        PathBuf::from(std::env::var("MIGRATIONS_DIR").unwrap_or_else(|_| "migrations".to_string()));
    let db = Database::connect_and_migrate(&config.database, &migrations_dir)
        .await
        .context("prepare ledger database")?;

    // 3. 审计
    let ledger_service = LedgerService::new(
        Arc::new(LedgerRepository::new(db.pool().clone())),
        &config.engine,
    );

    let requested: Vec<String> = std::env::args().skip(1).collect();
    let child_ids = if requested.is_empty() {
        ledger_service.list_child_ids().await?
    } else {
        requested
    };

    let mut violations = 0usize;
    for child_id in &child_ids {
        match ledger_service.verify_integrity(child_id).await {
            Ok(report) => info!(
                child_id = %report.child_id,
                entries = report.entry_count,
                balance = report.stored_balance,
                "账本校验通过"
            ),
            Err(PointsError::IntegrityViolation { .. }) => violations += 1,
            Err(PointsError::ChildNotFound(id)) => warn!(child_id = %id, "账户不存在，跳过"),
            Err(e) => {
                error!(child_id = %child_id, error = %e, "审计失败");
                violations += 1;
            }
        }
    }

    db.close().await;
    info!(audited = child_ids.len(), violations = violations, "审计完成");

    if violations > 0 {
        bail!("{} of {} ledgers failed the audit", violations, child_ids.len());
    }
    Ok(())
}

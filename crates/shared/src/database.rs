//! PostgreSQL 连接池
//!
//! 积分账本与兑换记录共用一个连接池。启动时先建池并探活，再按目录执行迁移，
//! 迁移文件随部署包分发，目录在运行时指定。

use crate::config::DatabaseConfig;
use crate::error::{InfraError, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 建立连接池并执行一次探活，连接串中的密码不会写入日志
    #[instrument(skip(config), fields(url = %redact_url(&config.url)))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        let db = Self { pool };
        db.health_check().await?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "账本数据库已连接"
        );
        Ok(db)
    }

    /// 连接并执行迁移
    pub async fn connect_and_migrate(config: &DatabaseConfig, migrations_dir: &Path) -> Result<Self> {
        let db = Self::connect(config).await?;
        db.run_migrations(migrations_dir).await?;
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(InfraError::from)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("账本数据库连接池已关闭");
    }

    /// 执行迁移目录下尚未应用的迁移，返回目录中的迁移总数
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn run_migrations(&self, dir: &Path) -> Result<usize> {
        let migrator = Migrator::new(dir).await?;
        let known = migrator.iter().count();
        migrator.run(&self.pool).await?;
        info!(migrations = known, "数据库迁移完成");
        Ok(known)
    }
}

/// 隐去连接串中的密码
pub fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    match url.rfind('@') {
        Some(at) if at > scheme_end => {
            let user = url[scheme_end..at].split(':').next().unwrap_or_default();
            format!("{}{}:***{}", &url[..scheme_end], user, &url[at..])
        }
        _ => url.to_string(),
    }
}

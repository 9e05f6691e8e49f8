//! 兑换锁模块
//!
//! 为同一奖励的兑换请求提供互斥，Redis 优先、PostgreSQL 后备，
//! 未配置外部存储时使用进程内锁（单实例部署与测试）。
//!
//! ## 使用示例
//!
//! ```ignore
//! let lock_manager = LockManager::new(redis_client, Some(pool), LockConfig::default());
//!
//! let guard = lock_manager.acquire("redeem:reward:42", None).await?;
//! reserve_slot().await?;
//! guard.release().await?;
//! ```

mod lock_manager;

pub use lock_manager::{LockConfig, LockGuard, LockManager};

//! 锁管理器
//!
//! 后端优先级：Redis -> PostgreSQL -> 进程内。

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use points_shared::config::EngineConfig;
use redis::Client as RedisClient;
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{PointsError, Result};

/// 锁配置
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// 默认锁超时时间
    pub default_ttl: Duration,
    /// 获取锁重试次数
    pub retry_count: u32,
    /// 重试间隔
    pub retry_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(10),
            retry_count: 20,
            retry_delay: Duration::from_millis(25),
        }
    }
}

impl From<&EngineConfig> for LockConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            default_ttl: config.lock_ttl(),
            retry_count: config.lock_retry_count.max(1),
            retry_delay: config.lock_retry_delay(),
        }
    }
}

/// 进程内锁表：key -> (owner, 过期时刻)
type LocalLocks = Arc<DashMap<String, (String, Instant)>>;

/// 锁管理器
///
/// 优先使用 Redis；Redis 操作失败时降级到 PostgreSQL 的 distributed_locks 表；
/// 两者都未配置时使用进程内锁表。
pub struct LockManager {
    redis_client: Option<RedisClient>,
    pool: Option<PgPool>,
    local: LocalLocks,
    config: LockConfig,
    /// 实例唯一标识，用于区分不同进程持有的锁
    instance_id: String,
}

impl LockManager {
    /// 创建锁管理器
    ///
    /// # Arguments
    /// - `redis_client`: Redis 客户端（可选）
    /// - `pool`: PostgreSQL 连接池（可选）
    /// - `config`: 锁配置
    pub fn new(redis_client: Option<RedisClient>, pool: Option<PgPool>, config: LockConfig) -> Self {
        Self {
            redis_client,
            pool,
            local: Arc::new(DashMap::new()),
            config,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// 仅使用进程内锁
    pub fn local(config: LockConfig) -> Self {
        Self::new(None, None, config)
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// 获取锁
    ///
    /// 在重试次数内无法获取时返回 `LockConflict`
    #[instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn acquire(&self, key: &str, ttl: Option<Duration>) -> Result<LockGuard> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        // owner 格式: instance_id:uuid
        let owner = format!("{}:{}", self.instance_id, Uuid::new_v4());

        for attempt in 0..self.config.retry_count.max(1) {
            if let Some(guard) = self.try_backends(key, &owner, ttl).await? {
                debug!(key = %key, owner = %owner, attempt = attempt, "锁已获取");
                return Ok(guard);
            }

            if attempt + 1 < self.config.retry_count {
                debug!(
                    key = %key,
                    attempt = attempt,
                    retry_delay_ms = self.config.retry_delay.as_millis() as u64,
                    "锁被占用，等待重试"
                );
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(PointsError::LockConflict {
            resource: key.to_string(),
        })
    }

    /// 尝试获取锁，不重试
    #[instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn try_acquire(&self, key: &str, ttl: Option<Duration>) -> Result<Option<LockGuard>> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let owner = format!("{}:{}", self.instance_id, Uuid::new_v4());
        self.try_backends(key, &owner, ttl).await
    }

    async fn try_backends(&self, key: &str, owner: &str, ttl: Duration) -> Result<Option<LockGuard>> {
        if let Some(ref client) = self.redis_client {
            match try_redis_lock(client, key, owner, ttl).await {
                Ok(true) => {
                    return Ok(Some(LockGuard::new(
                        key,
                        owner,
                        LockBackend::Redis(client.clone()),
                    )));
                }
                Ok(false) => return Ok(None),
                Err(e) => {
                    // Redis 不可用，降级
                    warn!(key = %key, error = %e, "Redis 锁失败，降级到后备锁");
                }
            }
        }

        if let Some(ref pool) = self.pool {
            let acquired = try_db_lock(pool, key, owner, ttl).await?;
            return Ok(acquired.then(|| {
                LockGuard::new(key, owner, LockBackend::Database(pool.clone()))
            }));
        }

        let acquired = try_local_lock(&self.local, key, owner, ttl);
        Ok(acquired.then(|| LockGuard::new(key, owner, LockBackend::Local(self.local.clone()))))
    }
}

/// SET NX PX 原子获取 Redis 锁
async fn try_redis_lock(
    client: &RedisClient,
    key: &str,
    owner: &str,
    ttl: Duration,
) -> std::result::Result<bool, String> {
    let lock_key = format!("lock:{}", key);
    let ttl_ms = ttl.as_millis() as u64;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| e.to_string())?;

    let result: Option<String> = redis::cmd("SET")
        .arg(&lock_key)
        .arg(owner)
        .arg("NX")
        .arg("PX")
        .arg(ttl_ms)
        .query_async(&mut conn)
        .await
        .map_err(|e| e.to_string())?;

    Ok(result.is_some())
}

/// 基于 distributed_locks 表获取锁
///
/// 先清理过期锁，再 INSERT ON CONFLICT DO NOTHING
async fn try_db_lock(pool: &PgPool, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
    let expires_at = chrono::Utc::now()
        + chrono::Duration::from_std(ttl).map_err(|e| PointsError::Internal(e.to_string()))?;

    let deleted = sqlx::query(
        r#"DELETE FROM distributed_locks WHERE lock_key = $1 AND expires_at < NOW()"#,
    )
    .bind(key)
    .execute(pool)
    .await?;

    if deleted.rows_affected() > 0 {
        debug!(key = %key, "已清理过期的数据库锁");
    }

    let result = sqlx::query(
        r#"
        INSERT INTO distributed_locks (lock_key, owner_id, expires_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (lock_key) DO NOTHING
        "#,
    )
    .bind(key)
    .bind(owner)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn try_local_lock(locks: &DashMap<String, (String, Instant)>, key: &str, owner: &str, ttl: Duration) -> bool {
    let now = Instant::now();
    let mut acquired = false;

    locks
        .entry(key.to_string())
        .and_modify(|held| {
            // 过期锁可以直接接管
            if held.1 <= now {
                *held = (owner.to_string(), now + ttl);
                acquired = true;
            }
        })
        .or_insert_with(|| {
            acquired = true;
            (owner.to_string(), now + ttl)
        });

    acquired
}

/// 锁守卫
///
/// 应通过 `release()` 显式释放。Drop 时无法执行异步操作，
/// Redis/数据库锁只能等待 TTL 过期；进程内锁在 Drop 时直接移除。
pub struct LockGuard {
    key: String,
    owner: String,
    backend: LockBackend,
    released: bool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

enum LockBackend {
    Redis(RedisClient),
    Database(PgPool),
    Local(LocalLocks),
}

impl LockGuard {
    fn new(key: &str, owner: &str, backend: LockBackend) -> Self {
        Self {
            key: key.to_string(),
            owner: owner.to_string(),
            backend,
            released: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 显式释放锁
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        let removed = match &self.backend {
            LockBackend::Redis(client) => self.release_redis(client).await?,
            LockBackend::Database(pool) => self.release_db(pool).await?,
            LockBackend::Local(locks) => self.release_local(locks),
        };

        if removed {
            debug!(key = %self.key, "锁已释放");
        } else {
            // 通常表示锁已过期并被其他请求接管
            warn!(key = %self.key, owner = %self.owner, "锁已不属于当前持有者");
        }
        Ok(())
    }

    /// Lua 脚本校验 owner 后删除
    async fn release_redis(&self, client: &RedisClient) -> Result<bool> {
        let lock_key = format!("lock:{}", self.key);

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PointsError::Redis(e.to_string()))?;

        let script = r#"
            if redis.call("get", KEYS[1]) == ARGV[1] then
                return redis.call("del", KEYS[1])
            else
                return 0
            end
        "#;

        let result: i32 = redis::Script::new(script)
            .key(&lock_key)
            .arg(&self.owner)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| PointsError::Redis(e.to_string()))?;

        Ok(result != 0)
    }

    async fn release_db(&self, pool: &PgPool) -> Result<bool> {
        let result =
            sqlx::query(r#"DELETE FROM distributed_locks WHERE lock_key = $1 AND owner_id = $2"#)
                .bind(&self.key)
                .bind(&self.owner)
                .execute(pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    fn release_local(&self, locks: &DashMap<String, (String, Instant)>) -> bool {
        locks
            .remove_if(&self.key, |_, held| held.0 == self.owner)
            .is_some()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match &self.backend {
            LockBackend::Local(locks) => {
                self.release_local(locks);
            }
            _ => {
                warn!(
                    lock_key = %self.key,
                    owner = %self.owner,
                    "LockGuard 未显式释放，等待 TTL 过期"
                );
            }
        }
    }
}

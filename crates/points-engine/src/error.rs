//! 积分引擎错误类型
//!
//! 定义服务层的业务错误和系统错误

use thiserror::Error;

use crate::models::CapViolation;

/// 积分引擎错误类型
#[derive(Debug, Error)]
pub enum PointsError {
    // === 校验错误 ===
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("孩子账户不存在: {0}")]
    ChildNotFound(String),

    #[error("奖励不存在: {0}")]
    RewardNotFound(i64),

    #[error("奖励已停用: {0}")]
    RewardInactive(i64),

    #[error("兑换记录不存在: {0}")]
    RedemptionNotFound(i64),

    #[error("兑换状态不允许此操作: redemption_id={redemption_id}, {from} -> {to}")]
    InvalidStatusTransition {
        redemption_id: i64,
        from: String,
        to: String,
    },

    // === 业务结果 ===
    /// 兑换上限/过期拒绝，原因原样展示给用户
    #[error("{0}")]
    CapViolation(CapViolation),

    #[error("积分余额不足: 需要 {required}, 可用 {available}")]
    InsufficientBalance { required: i64, available: i64 },

    // === 并发与一致性 ===
    #[error("并发冲突，请重试")]
    ConcurrencyConflict,

    #[error("锁冲突: {resource}")]
    LockConflict { resource: String },

    #[error(
        "账本完整性异常: child_id={child_id}, 存储余额 {stored_balance}, 回放余额 {replayed_balance}"
    )]
    IntegrityViolation {
        child_id: String,
        stored_balance: i64,
        replayed_balance: i64,
    },

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[source] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis 错误: {0}")]
    Redis(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 积分引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, PointsError>;

impl PointsError {
    /// 检查是否为可重试的错误
    ///
    /// 只有并发冲突类错误会在引擎内部自动重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict | Self::LockConflict { .. })
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_)
                | Self::Serialization(_)
                | Self::Redis(_)
                | Self::Internal(_)
                | Self::ConcurrencyConflict
                | Self::LockConflict { .. }
                | Self::IntegrityViolation { .. }
        )
    }

    /// 是否为致命错误，需要人工介入
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IntegrityViolation { .. })
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ChildNotFound(_) => "CHILD_NOT_FOUND",
            Self::RewardNotFound(_) => "REWARD_NOT_FOUND",
            Self::RewardInactive(_) => "REWARD_INACTIVE",
            Self::RedemptionNotFound(_) => "REDEMPTION_NOT_FOUND",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::CapViolation(violation) => violation.code(),
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::LockConflict { .. } => "LOCK_CONFLICT",
            Self::IntegrityViolation { .. } => "INTEGRITY_VIOLATION",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 对应的 HTTP 状态码，供上层 handler 直接使用
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidStatusTransition { .. } => 400,
            Self::ChildNotFound(_) | Self::RewardNotFound(_) | Self::RedemptionNotFound(_) => 404,
            Self::RewardInactive(_) | Self::CapViolation(_) | Self::InsufficientBalance { .. } => {
                409
            }
            Self::ConcurrencyConflict | Self::LockConflict { .. } => 503,
            _ => 500,
        }
    }

    /// 面向用户的提示信息
    ///
    /// 兑换拒绝原因原样返回，并发冲突统一提示重试，系统错误不暴露细节
    pub fn user_message(&self) -> String {
        match self {
            Self::CapViolation(violation) => violation.reason().to_string(),
            Self::ConcurrencyConflict | Self::LockConflict { .. } => {
                "The request could not be completed, please try again.".to_string()
            }
            err if err.is_business_error() => err.to_string(),
            _ => "Internal error.".to_string(),
        }
    }

    /// 将数据库错误中的锁冲突/序列化失败转换为并发冲突
    ///
    /// PostgreSQL SQLSTATE：40001 serialization_failure、40P01 deadlock_detected、
    /// 55P03 lock_not_available
    pub fn from_db(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if let Some(code) = db_err.code() {
                if matches!(code.as_ref(), "40001" | "40P01" | "55P03") {
                    return Self::ConcurrencyConflict;
                }
            }
        }
        Self::Database(err)
    }
}

impl From<sqlx::Error> for PointsError {
    fn from(err: sqlx::Error) -> Self {
        Self::from_db(err)
    }
}

impl From<validator::ValidationErrors> for PointsError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

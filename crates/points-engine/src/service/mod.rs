//! 服务层
//!
//! 编排纯函数计算模块与仓储层，负责参数校验、冲突重试、指标与日志。
//!
//! ## 模块结构
//!
//! - `dto`: 数据传输对象定义
//! - `ledger_service`: 积分流水、任务完成入账、账本审计
//! - `redemption_service`: 奖励兑换与兑换生命周期
//! - `cap_projector`: 奖励上限展示数据（只读）

pub mod cap_projector;
pub mod dto;
pub mod ledger_service;
pub mod redemption_service;

pub use cap_projector::CapDataService;
pub use dto::*;
pub use ledger_service::LedgerService;
pub use redemption_service::RedemptionService;

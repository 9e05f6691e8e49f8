//! 测试套件模块
//!
//! 按业务流程组织的测试用例集合。

pub mod data_consistency;
pub mod household_week;

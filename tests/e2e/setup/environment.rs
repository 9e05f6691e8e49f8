//! 测试环境管理
//!
//! 组装内存仓储、进程内锁与全部服务，模拟一个家庭的积分系统。

use std::sync::Arc;

use anyhow::Result;
use points_engine::dto::{CompleteTaskRequest, RedeemRewardRequest, TaskCompletionResult};
use points_engine::{
    CapDataService, InMemoryPointsStore, LedgerService, LockConfig, LockManager,
    RedemptionReceipt, RedemptionService, Reward,
};
use points_shared::config::EngineConfig;

use crate::data::RewardFixture;

/// 端到端测试环境
pub struct TestEnvironment {
    pub store: Arc<InMemoryPointsStore>,
    pub ledger: Arc<LedgerService<InMemoryPointsStore>>,
    pub redemption: Arc<RedemptionService<InMemoryPointsStore>>,
    pub cap_data: Arc<CapDataService<InMemoryPointsStore>>,
}

impl TestEnvironment {
    pub fn setup() -> Self {
        let config = EngineConfig {
            max_attempts: 10,
            retry_initial_delay_ms: 1,
            retry_max_delay_ms: 10,
            lock_retry_count: 500,
            lock_retry_delay_ms: 1,
            ..Default::default()
        };
        let store = Arc::new(InMemoryPointsStore::new());
        let lock_manager = Arc::new(LockManager::local(LockConfig::from(&config)));

        Self {
            ledger: Arc::new(LedgerService::new(store.clone(), &config)),
            redemption: Arc::new(RedemptionService::new(
                store.clone(),
                lock_manager,
                &config,
            )),
            cap_data: Arc::new(CapDataService::new(store.clone())),
            store,
        }
    }

    pub fn add_reward(&self, fixture: RewardFixture) -> Reward {
        self.store.insert_reward(fixture.build())
    }

    pub async fn complete(&self, request: CompleteTaskRequest) -> Result<TaskCompletionResult> {
        Ok(self.ledger.complete_task(request).await?)
    }

    pub async fn redeem(&self, child_id: &str, reward_id: i64) -> Result<RedemptionReceipt> {
        Ok(self
            .redemption
            .redeem(RedeemRewardRequest::new(child_id, reward_id))
            .await?)
    }

    /// 审计所有账户，返回审计过的孩子数
    pub async fn audit_all(&self) -> Result<usize> {
        let child_ids = self.ledger.list_child_ids().await?;
        for child_id in &child_ids {
            self.ledger.verify_integrity(child_id).await?;
        }
        Ok(child_ids.len())
    }
}

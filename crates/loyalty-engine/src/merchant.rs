//! 商户子等级追踪与积分计划配置
//!
//! 子等级只由账户在该商户处的购买次数决定，与全局等级互不影响。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::models::{Account, MerchantConfig, MerchantLoyalty, MerchantTier};
use crate::store::LoyaltyStore;

/// 在账户聚合上记录一次商户购买
///
/// 首单创建记录（计数 1、Bronze），此后每单递增并重算子等级。
/// 在累积流程的原子更新闭包内调用。
pub(crate) fn apply_merchant_order(
    account: &mut Account,
    merchant_id: &str,
    now: DateTime<Utc>,
) -> MerchantTier {
    let loyalty = account
        .merchant_tiers
        .entry(merchant_id.to_string())
        .and_modify(|ml| ml.record_order(now))
        .or_insert_with(|| MerchantLoyalty::first_order(now));

    debug!(
        merchant_id,
        purchase_count = loyalty.purchase_count,
        sub_tier = %loyalty.sub_tier,
        "商户子等级已更新"
    );
    loyalty.sub_tier
}

/// 商户子等级追踪器 / 积分计划配置服务
pub struct MerchantTierTracker {
    store: Arc<LoyaltyStore>,
}

impl MerchantTierTracker {
    pub fn new(store: Arc<LoyaltyStore>) -> Self {
        Self { store }
    }

    /// 写入商户积分计划配置
    ///
    /// 倍率表键在写入时归一化（与查找侧共用同一函数）。
    #[instrument(skip(self, multipliers), fields(merchant_id = %merchant_id))]
    pub async fn set_points_config(
        &self,
        merchant_id: &str,
        multipliers: HashMap<String, f64>,
        enabled: bool,
    ) {
        let mut config = MerchantConfig::new(merchant_id);
        config.program_enabled = enabled;
        config.set_multipliers(multipliers);

        self.store.merchants.put(merchant_id, config);
        info!(merchant_id, enabled, "商户积分计划配置已更新");
    }

    /// 查询商户积分计划配置
    pub async fn config(&self, merchant_id: &str) -> Option<MerchantConfig> {
        self.store.merchants.get(merchant_id)
    }

    /// 查询账户在指定商户处的子等级记录
    pub async fn merchant_loyalty(
        &self,
        account_id: &str,
        merchant_id: &str,
    ) -> Result<Option<MerchantLoyalty>> {
        let account = self.store.accounts.get_required(account_id)?;
        Ok(account.merchant_tiers.get(merchant_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_merchant_order_creates_then_increments() {
        let now = Utc::now();
        let mut account = Account::new("acc-1", "Alice", now);

        // 首单创建 Bronze 记录
        let tier = apply_merchant_order(&mut account, "mer-1", now);
        assert_eq!(tier, MerchantTier::Bronze);
        assert_eq!(account.merchant_tiers["mer-1"].purchase_count, 1);

        // 第 2 单仍为 Bronze，第 3 单升 Silver
        apply_merchant_order(&mut account, "mer-1", now);
        let tier = apply_merchant_order(&mut account, "mer-1", now);
        assert_eq!(tier, MerchantTier::Silver);

        // 不同商户互不影响
        let tier = apply_merchant_order(&mut account, "mer-2", now);
        assert_eq!(tier, MerchantTier::Bronze);
        assert_eq!(account.merchant_tiers.len(), 2);
    }

    #[test]
    fn test_apply_merchant_order_gold_after_six() {
        let now = Utc::now();
        let mut account = Account::new("acc-1", "Alice", now);

        let mut tier = MerchantTier::Bronze;
        for _ in 0..6 {
            tier = apply_merchant_order(&mut account, "mer-1", now);
        }
        assert_eq!(tier, MerchantTier::Gold);
        assert_eq!(account.merchant_tiers["mer-1"].purchase_count, 6);
    }

    #[tokio::test]
    async fn test_set_and_query_points_config() {
        let store = Arc::new(LoyaltyStore::new());
        let tracker = MerchantTierTracker::new(Arc::clone(&store));

        tracker
            .set_points_config(
                "mer-1",
                HashMap::from([("Électronique".to_string(), 1.5)]),
                true,
            )
            .await;

        let config = tracker.config("mer-1").await.unwrap();
        assert!(config.program_enabled);
        assert_eq!(config.multiplier_for("electronique"), 1.5);

        // 重新写入整体替换
        tracker
            .set_points_config("mer-1", HashMap::new(), false)
            .await;
        let config = tracker.config("mer-1").await.unwrap();
        assert!(!config.program_enabled);
        assert_eq!(config.multiplier_for("electronique"), 1.0);
    }

    #[tokio::test]
    async fn test_merchant_loyalty_query() {
        let store = Arc::new(LoyaltyStore::new());
        let tracker = MerchantTierTracker::new(Arc::clone(&store));
        let now = Utc::now();

        let mut account = Account::new("acc-1", "Alice", now);
        apply_merchant_order(&mut account, "mer-1", now);
        store.accounts.insert_new("acc-1", account).unwrap();

        let loyalty = tracker.merchant_loyalty("acc-1", "mer-1").await.unwrap();
        assert_eq!(loyalty.unwrap().purchase_count, 1);

        let none = tracker.merchant_loyalty("acc-1", "mer-2").await.unwrap();
        assert!(none.is_none());

        assert!(tracker.merchant_loyalty("ghost", "mer-1").await.is_err());
    }
}

//! 订单积分累积
//!
//! 消费来自结算流程的订单确认事件：按分类倍率逐行计算基础积分，
//! 叠加生效中的积分倍率特惠后取整，然后在账户聚合的一次原子更新内
//! 完成入账、购买计数、活跃月份刷新、商户子等级更新与等级重算。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loyalty_shared::config::EngineConfig;
use loyalty_shared::events::{EventEnvelope, EventSink, LoyaltyEvent, OrderConfirmed};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{EngineError, Result};
use crate::ledger::apply_credit;
use crate::merchant::apply_merchant_order;
use crate::models::{MerchantConfig, MerchantTier, Tier};
use crate::offers::find_active_multiplier;
use crate::store::LoyaltyStore;
use crate::tier::apply_tier;

/// 一次累积的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualOutcome {
    /// 叠加特惠前的基础积分
    pub base_points: u64,
    /// 实际应用的特惠倍率（无生效特惠时为 None）
    pub offer_multiplier: Option<f64>,
    /// 最终入账积分
    pub final_points: u64,
    pub new_balance: u64,
    pub tier: Tier,
    pub merchant_tier: MerchantTier,
}

/// 订单累积服务
pub struct OrderAccrual {
    store: Arc<LoyaltyStore>,
    sink: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl OrderAccrual {
    pub fn new(store: Arc<LoyaltyStore>, sink: Arc<dyn EventSink>, config: EngineConfig) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    /// 处理订单确认事件
    ///
    /// 积分公式：`line = price × quantity × 分类倍率 × base_rate`，
    /// 逐行求和得基础积分；存在生效的倍率特惠时乘以倍率后四舍五入。
    /// 非正的价格或数量的订单行不计分但不报错（按原样记为 0 分行）。
    #[instrument(
        skip(self, event),
        fields(account_id = %event.account_id, merchant_id = %event.merchant_id)
    )]
    pub async fn process_order(
        &self,
        event: &OrderConfirmed,
        now: DateTime<Utc>,
    ) -> Result<AccrualOutcome> {
        if event.items.is_empty() {
            return Err(EngineError::Validation("订单行不能为空".to_string()));
        }

        let merchant_config = self.store.merchants.get(&event.merchant_id);
        let base = self.base_points(event, merchant_config.as_ref());

        // 叠加生效中的积分倍率特惠，乘完再一次性取整
        let offer = find_active_multiplier(&self.store, &event.merchant_id, now);
        let offer_multiplier = offer.as_ref().and_then(|o| o.multiplier());
        let final_points = match offer_multiplier {
            Some(multiplier) => (base * multiplier).round() as u64,
            None => base.round() as u64,
        };

        debug!(
            base_points = base,
            ?offer_multiplier,
            final_points,
            "订单积分已计算"
        );

        let merchant_id = event.merchant_id.clone();
        let (outcome, events) = self.store.accounts.update(&event.account_id, |account| {
            let mut events = Vec::new();

            let new_balance = if final_points > 0 {
                let (balance, credit_event) =
                    apply_credit(account, final_points, "order", now)?;
                events.push(credit_event);
                balance
            } else {
                account.point_balance
            };

            account.progress.purchase_count += 1;
            account.record_activity_date(now.date_naive());
            let merchant_tier = apply_merchant_order(account, &merchant_id, now);
            events.extend(apply_tier(account, now));

            Ok((
                AccrualOutcome {
                    base_points: base.round() as u64,
                    offer_multiplier,
                    final_points,
                    new_balance,
                    tier: account.tier,
                    merchant_tier,
                },
                events,
            ))
        })?;

        info!(
            account_id = %event.account_id,
            final_points,
            new_balance = outcome.new_balance,
            tier = %outcome.tier,
            "订单积分已入账"
        );

        for event in events {
            self.sink.publish(EventEnvelope::new(event)).await;
        }
        Ok(outcome)
    }

    /// 逐行计算基础积分
    ///
    /// 分类倍率查找经过归一化（商户配置缺失时全部按 1.0）。
    fn base_points(&self, event: &OrderConfirmed, config: Option<&MerchantConfig>) -> f64 {
        event
            .items
            .iter()
            .filter(|line| line.price > 0.0 && line.quantity > 0)
            .map(|line| {
                let multiplier = config
                    .map(|c| c.multiplier_for(&line.category))
                    .unwrap_or(1.0);
                line.price * line.quantity as f64 * multiplier * self.config.accrual_base_rate
            })
            .sum()
    }
}

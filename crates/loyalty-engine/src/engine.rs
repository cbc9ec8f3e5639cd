//! 引擎门面
//!
//! 把聚合存储、事件出口与各业务服务装配为一个入口，并暴露与外部
//! 协作方约定的事件形入口（订单确认、推荐注册、活动记录、兑换请求、
//! 兑换码查询）。调用方（HTTP 层、消息消费者）只与门面交互。

use std::sync::Arc;

use chrono::Utc;
use loyalty_shared::config::EngineConfig;
use loyalty_shared::events::{
    ActivityKind, ActivityRecorded, EventSink, OrderConfirmed, RedemptionCodeLookup,
    RedemptionRequest, ReferralRegistration, TracingEventSink,
};
use tracing::instrument;

use crate::accrual::{AccrualOutcome, OrderAccrual};
use crate::badges::BadgeAchievementTracker;
use crate::error::{EngineError, Result};
use crate::ledger::PointsLedger;
use crate::merchant::MerchantTierTracker;
use crate::models::{Account, Badge, NotificationState, PointExchange};
use crate::offers::SpecialOfferResolver;
use crate::redemption::RedemptionExchange;
use crate::referral::ReferralRewardChain;
use crate::store::LoyaltyStore;

/// 忠诚度引擎
///
/// 各服务共享同一份聚合存储与事件出口。
pub struct LoyaltyEngine {
    store: Arc<LoyaltyStore>,
    pub ledger: PointsLedger,
    pub accrual: OrderAccrual,
    pub merchants: MerchantTierTracker,
    pub offers: SpecialOfferResolver,
    pub referrals: ReferralRewardChain,
    pub badges: BadgeAchievementTracker,
    pub redemptions: RedemptionExchange,
}

impl LoyaltyEngine {
    /// 按配置与事件出口装配引擎
    pub fn new(config: EngineConfig, sink: Arc<dyn EventSink>) -> Self {
        let store = Arc::new(LoyaltyStore::with_retries(config.max_update_retries));

        Self {
            ledger: PointsLedger::new(Arc::clone(&store), Arc::clone(&sink)),
            accrual: OrderAccrual::new(Arc::clone(&store), Arc::clone(&sink), config.clone()),
            merchants: MerchantTierTracker::new(Arc::clone(&store)),
            offers: SpecialOfferResolver::new(Arc::clone(&store)),
            referrals: ReferralRewardChain::new(
                Arc::clone(&store),
                Arc::clone(&sink),
                config.clone(),
            ),
            badges: BadgeAchievementTracker::new(Arc::clone(&store), Arc::clone(&sink)),
            redemptions: RedemptionExchange::new(Arc::clone(&store), Arc::clone(&sink), config),
            store,
        }
    }

    /// 默认装配：默认配置 + 日志事件出口
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default(), Arc::new(TracingEventSink))
    }

    /// 聚合存储（测试与运维工具使用）
    pub fn store(&self) -> &Arc<LoyaltyStore> {
        &self.store
    }

    /// 查询账户快照
    pub async fn account(&self, account_id: &str) -> Result<Account> {
        self.store.accounts.get_required(account_id)
    }

    /// 标记站内通知为已读（对已读通知幂等）
    pub async fn mark_notification_read(
        &self,
        account_id: &str,
        notification_id: &str,
    ) -> Result<()> {
        let notification_id = notification_id.to_string();
        self.store.accounts.update(account_id, |account| {
            let notification = account
                .notifications
                .iter_mut()
                .find(|n| n.id == notification_id)
                .ok_or_else(|| {
                    EngineError::Validation(format!("通知不存在: {notification_id}"))
                })?;
            notification.state = NotificationState::Read;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // 事件形入口 — 与外部协作方的契约
    // ------------------------------------------------------------------

    /// 订单确认：积分累积
    #[instrument(skip(self, event), fields(account_id = %event.account_id))]
    pub async fn handle_order_confirmed(&self, event: OrderConfirmed) -> Result<AccrualOutcome> {
        self.accrual.process_order(&event, Utc::now()).await
    }

    /// 推荐注册：应用推荐奖励链
    ///
    /// 账户本身由（范围外的）认证流程创建后上报此事件；未携带推荐码的
    /// 注册无需引擎处理。
    #[instrument(skip(self, event), fields(account_id = %event.new_account_id))]
    pub async fn handle_referral_registration(&self, event: ReferralRegistration) -> Result<()> {
        match event.referral_code {
            Some(code) => {
                self.referrals
                    .apply_referral(&event.new_account_id, &code, Utc::now())
                    .await
            }
            None => Ok(()),
        }
    }

    /// 活动记录：喂给徽章追踪器
    ///
    /// 返回本次活动新授予的徽章。
    #[instrument(skip(self, event), fields(account_id = %event.account_id))]
    pub async fn handle_activity_recorded(&self, event: ActivityRecorded) -> Result<Vec<Badge>> {
        match &event.activity {
            ActivityKind::Scan { code } => {
                self.badges
                    .record_scan(&event.account_id, code, event.timestamp)
                    .await
            }
            ActivityKind::ScreenVisit { screen } => {
                self.badges
                    .record_screen_visit(&event.account_id, screen, event.timestamp)
                    .await
            }
        }
    }

    /// 兑换请求：积分换物品
    #[instrument(skip(self, event), fields(account_id = %event.account_id))]
    pub async fn handle_redemption_request(
        &self,
        event: RedemptionRequest,
    ) -> Result<PointExchange> {
        self.redemptions
            .exchange(&event.account_id, &event.item_id, Utc::now())
            .await
    }

    /// 兑换码查询：商户核销前校验
    #[instrument(skip(self, event))]
    pub async fn handle_code_lookup(&self, event: RedemptionCodeLookup) -> Result<PointExchange> {
        self.redemptions.validate_code(&event.code, Utc::now()).await
    }
}

//! 限时特惠解析与领取
//!
//! 累积流程通过 `find_active_multiplier` 查找商户当前生效的积分倍率
//! 特惠；领取型特惠（买一送一等）通过 `claim_offer` 一次性领取，
//! 领取后 `claimed = true`，之后对任何流程都不再生效。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::error::{EngineError, Result};
use crate::models::{OfferKind, PromotionalOffer};
use crate::store::LoyaltyStore;

/// 查找商户当前生效的积分倍率特惠
///
/// 条件：倍率类型、未领取、`start_date <= now < end_date`。
/// 多个同时生效时取开始时间最早的一个，保证结果确定。
pub(crate) fn find_active_multiplier(
    store: &LoyaltyStore,
    merchant_id: &str,
    now: DateTime<Utc>,
) -> Option<PromotionalOffer> {
    store
        .offers
        .list_by(|offer| {
            offer.merchant_id == merchant_id
                && matches!(offer.kind, OfferKind::PointsMultiplier { .. })
                && offer.is_active(now)
        })
        .into_iter()
        .min_by_key(|offer| offer.start_date)
}

/// 特惠服务
pub struct SpecialOfferResolver {
    store: Arc<LoyaltyStore>,
}

impl SpecialOfferResolver {
    pub fn new(store: Arc<LoyaltyStore>) -> Self {
        Self { store }
    }

    /// 登记一个特惠
    pub async fn add_offer(&self, offer: PromotionalOffer) -> Result<()> {
        let offer_id = offer.id.clone();
        self.store.offers.insert_new(&offer_id, offer)?;
        info!(offer_id = %offer_id, "特惠已登记");
        Ok(())
    }

    /// 查找商户当前生效的积分倍率特惠
    pub async fn find_active_multiplier(
        &self,
        merchant_id: &str,
        now: DateTime<Utc>,
    ) -> Option<PromotionalOffer> {
        find_active_multiplier(&self.store, merchant_id, now)
    }

    /// 商户的全部特惠
    pub async fn merchant_offers(&self, merchant_id: &str) -> Vec<PromotionalOffer> {
        let mut offers = self
            .store
            .offers
            .list_by(|offer| offer.merchant_id == merchant_id);
        offers.sort_by_key(|offer| offer.start_date);
        offers
    }

    /// 领取特惠
    ///
    /// 已领取报 `OfferAlreadyClaimed`，已过窗口报 `OfferExpired`，
    /// 否则置 `claimed = true` 并返回更新后的特惠。
    #[instrument(skip(self), fields(offer_id = %offer_id, account_id = %account_id))]
    pub async fn claim_offer(
        &self,
        offer_id: &str,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PromotionalOffer> {
        let offer = self.store.offers.update(offer_id, |offer| {
            if offer.claimed {
                return Err(EngineError::OfferAlreadyClaimed(offer.id.clone()));
            }
            if now > offer.end_date {
                return Err(EngineError::OfferExpired(offer.id.clone()));
            }
            offer.claimed = true;
            Ok(offer.clone())
        })?;

        info!(offer_id, account_id, "特惠已领取");
        Ok(offer)
    }
}

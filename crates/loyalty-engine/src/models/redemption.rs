//! 兑换相关实体定义
//!
//! 兑换目录物品与积分兑换记录。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{ExchangeStatus, ItemCategory};

/// 兑换目录物品
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionItem {
    pub id: String,
    pub title: String,
    pub description: String,
    /// 兑换所需积分，至少为 1
    pub points_required: u64,
    pub category: ItemCategory,
    pub is_available: bool,
    /// 兑换上限（None 表示不限量）
    pub max_redemptions: Option<u32>,
    /// 已兑换数量，受 `max_redemptions` 约束
    pub current_redemptions: u32,
    /// 物品下架时间（None 表示长期有效）
    pub expiry_date: Option<DateTime<Utc>>,
    pub terms: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RedemptionItem {
    /// 是否还有兑换余量
    pub fn has_capacity(&self) -> bool {
        match self.max_redemptions {
            Some(max) => self.current_redemptions < max,
            None => true, // 不限量
        }
    }

    /// 是否可兑换：上架中、未过期、有余量
    pub fn can_redeem(&self, now: DateTime<Utc>) -> bool {
        self.is_available
            && self.expiry_date.is_none_or(|expiry| expiry > now)
            && self.has_capacity()
    }

    /// 不可兑换的原因描述（用于错误信息）
    pub fn unavailable_reason(&self, now: DateTime<Utc>) -> &'static str {
        if !self.is_available {
            "已下架"
        } else if self.expiry_date.is_some_and(|expiry| expiry <= now) {
            "已过期"
        } else if !self.has_capacity() {
            "已达兑换上限"
        } else {
            "可兑换"
        }
    }
}

/// 积分兑换记录
///
/// 一次积分换物品的交易：扣减的积分、兑换码与生命周期状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointExchange {
    pub id: String,
    pub account_id: String,
    pub item_id: String,
    pub points_used: u64,
    pub status: ExchangeStatus,
    /// 8 位大写字母数字兑换码，全局唯一
    pub redemption_code: String,
    pub exchange_date: DateTime<Utc>,
    /// 兑换码有效期截止（exchange_date + 有效天数）
    pub expiry_date: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl PointExchange {
    /// 是否已过有效期（只看时间，不看状态）
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date < now
    }

    /// 兑换码当前是否可核销
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status == ExchangeStatus::Confirmed && !self.is_expired(now)
    }
}

/// 账户兑换统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeStats {
    pub total_exchanges: u64,
    pub total_points_used: u64,
    pub pending: u64,
    pub confirmed: u64,
    pub redeemed: u64,
    pub expired: u64,
    pub cancelled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_item() -> RedemptionItem {
        RedemptionItem {
            id: "itm-001".to_string(),
            title: "免费咖啡".to_string(),
            description: "任意门店兑换一杯咖啡".to_string(),
            points_required: 300,
            category: ItemCategory::FoodDrink,
            is_available: true,
            max_redemptions: Some(10),
            current_redemptions: 0,
            expiry_date: None,
            terms: None,
            created_at: Utc::now(),
        }
    }

    fn create_test_exchange() -> PointExchange {
        let now = Utc::now();
        PointExchange {
            id: "exc-001".to_string(),
            account_id: "acc-001".to_string(),
            item_id: "itm-001".to_string(),
            points_used: 300,
            status: ExchangeStatus::Confirmed,
            redemption_code: "AB12CD34".to_string(),
            exchange_date: now,
            expiry_date: now + Duration::days(30),
            redeemed_at: None,
            notes: None,
        }
    }

    #[test]
    fn test_item_capacity() {
        let mut item = create_test_item();
        assert!(item.has_capacity());

        item.current_redemptions = 9;
        assert!(item.has_capacity());

        item.current_redemptions = 10;
        assert!(!item.has_capacity());

        // 不限量
        item.max_redemptions = None;
        assert!(item.has_capacity());
    }

    #[test]
    fn test_item_can_redeem() {
        let now = Utc::now();
        let mut item = create_test_item();
        assert!(item.can_redeem(now));

        item.is_available = false;
        assert!(!item.can_redeem(now));
        assert_eq!(item.unavailable_reason(now), "已下架");

        item.is_available = true;
        item.expiry_date = Some(now - Duration::hours(1));
        assert!(!item.can_redeem(now));
        assert_eq!(item.unavailable_reason(now), "已过期");

        item.expiry_date = Some(now + Duration::days(7));
        item.current_redemptions = 10;
        assert!(!item.can_redeem(now));
        assert_eq!(item.unavailable_reason(now), "已达兑换上限");
    }

    #[test]
    fn test_exchange_expiry() {
        let exchange = create_test_exchange();
        let now = Utc::now();

        assert!(!exchange.is_expired(now));
        assert!(exchange.is_valid(now));

        // 有效期过后
        let later = now + Duration::days(31);
        assert!(exchange.is_expired(later));
        assert!(!exchange.is_valid(later));
    }

    #[test]
    fn test_exchange_valid_requires_confirmed() {
        let mut exchange = create_test_exchange();
        let now = Utc::now();

        exchange.status = ExchangeStatus::Redeemed;
        assert!(!exchange.is_valid(now));

        exchange.status = ExchangeStatus::Cancelled;
        assert!(!exchange.is_valid(now));
    }

    #[test]
    fn test_exchange_serialization() {
        let exchange = create_test_exchange();
        let json = serde_json::to_string(&exchange).unwrap();

        assert!(json.contains("redemptionCode"));
        assert!(json.contains("\"status\":\"CONFIRMED\""));

        let restored: PointExchange = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.redemption_code, "AB12CD34");
        assert_eq!(restored.points_used, 300);
    }
}

//! 限时特惠实体定义
//!
//! 特惠类型用携带负载的枚举表达，替代「类型字符串 + 松散字段」的写法：
//! 倍率类特惠必然带倍率，非倍率特惠在类型上就不可能被累积逻辑误用。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 特惠类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferKind {
    /// 百分比折扣（由结算方应用，引擎只存储）
    #[serde(rename_all = "camelCase")]
    PercentDiscount { percent: f64 },
    /// 积分倍率：累积时对本单基础积分做乘法
    #[serde(rename_all = "camelCase")]
    PointsMultiplier { multiplier: f64 },
    /// 买一送一（领取型）
    BuyOneGetOne,
    /// 自定义特惠（领取型，内容由运营描述）
    #[serde(rename_all = "camelCase")]
    Custom { label: String },
}

/// 限时特惠
///
/// 时间窗口为左闭右开：`start_date <= now < end_date`。
/// 领取型特惠被领取一次后 `claimed = true`，之后不再生效。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionalOffer {
    pub id: String,
    pub merchant_id: String,
    pub kind: OfferKind,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub claimed: bool,
}

impl PromotionalOffer {
    pub fn new(
        id: impl Into<String>,
        merchant_id: impl Into<String>,
        kind: OfferKind,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            merchant_id: merchant_id.into(),
            kind,
            start_date,
            end_date,
            claimed: false,
        }
    }

    /// 特惠当前是否生效
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.claimed && self.start_date <= now && now < self.end_date
    }

    /// 倍率类特惠的倍率
    pub fn multiplier(&self) -> Option<f64> {
        match &self.kind {
            OfferKind::PointsMultiplier { multiplier } => Some(*multiplier),
            _ => None,
        }
    }
}

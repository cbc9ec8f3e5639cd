//! 领域模型
//!
//! 账户聚合、商户忠诚度、兑换目录与兑换记录、限时特惠的实体定义。

pub mod account;
pub mod enums;
pub mod merchant;
pub mod offer;
pub mod redemption;

pub use account::{Account, LoyaltyProgress, Notification, ReferralReward};
pub use enums::{
    Badge, ExchangeStatus, ItemCategory, MerchantTier, NotificationState, Screen, Tier,
};
pub use merchant::{MerchantConfig, MerchantLoyalty};
pub use offer::{OfferKind, PromotionalOffer};
pub use redemption::{ExchangeStats, PointExchange, RedemptionItem};

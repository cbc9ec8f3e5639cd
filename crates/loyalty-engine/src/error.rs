//! 引擎业务错误类型
//!
//! 定义积分、等级、徽章与兑换各操作的业务错误和系统错误。

use thiserror::Error;

/// 引擎业务错误类型
#[derive(Debug, Error)]
pub enum EngineError {
    // === 积分账本相关错误 ===
    #[error("积分数量无效: {amount}，必须为正整数")]
    InvalidAmount { amount: u64 },

    #[error("积分不足: 需要 {required}, 实际 {actual}")]
    InsufficientPoints { required: u64, actual: u64 },

    #[error("账户不存在: {0}")]
    AccountNotFound(String),

    #[error("商户积分计划未启用: merchant_id={merchant_id}")]
    ProgramDisabled { merchant_id: String },

    // === 推荐相关错误 ===
    #[error("推荐码无效: {0}")]
    InvalidReferralCode(String),

    // === 徽章相关错误 ===
    #[error("徽章已授予: {badge}")]
    AlreadyAwarded { badge: String },

    #[error("徽章条件未满足: {badge}")]
    BadgeNotEligible { badge: String },

    // === 特惠相关错误 ===
    #[error("特惠不存在: {0}")]
    OfferNotFound(String),

    #[error("特惠已过期: {0}")]
    OfferExpired(String),

    #[error("特惠已被领取: {0}")]
    OfferAlreadyClaimed(String),

    // === 兑换相关错误 ===
    #[error("兑换物品不存在: {0}")]
    ItemNotFound(String),

    #[error("兑换物品不可用: item_id={item_id}, {reason}")]
    ItemUnavailable { item_id: String, reason: String },

    #[error("兑换记录不存在: {0}")]
    ExchangeNotFound(String),

    #[error("兑换码不存在: {0}")]
    CodeNotFound(String),

    #[error("兑换码已被使用: {0}")]
    AlreadyRedeemed(String),

    #[error("兑换码已过期: {0}")]
    CodeExpired(String),

    #[error("兑换已被取消: {0}")]
    AlreadyCancelled(String),

    // === 系统错误 ===
    #[error("并发冲突，请重试: {resource}")]
    ConcurrencyConflict { resource: String },

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// 检查是否为可重试的错误
    ///
    /// 只有乐观并发冲突值得调用方重试，业务拒绝重试后结果不变。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::Internal(_)
        )
    }

    /// 检查错误返回前是否可能已发生状态变更
    ///
    /// 过期检测是特例：记录先被置为 Expired，再报告 CodeExpired。
    /// 调用方据此区分「什么都没发生」与「状态已变、请求失败」。
    pub fn may_have_mutated(&self) -> bool {
        matches!(self, Self::CodeExpired(_))
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::ProgramDisabled { .. } => "PROGRAM_DISABLED",
            Self::InvalidReferralCode(_) => "INVALID_REFERRAL_CODE",
            Self::AlreadyAwarded { .. } => "ALREADY_AWARDED",
            Self::BadgeNotEligible { .. } => "BADGE_NOT_ELIGIBLE",
            Self::OfferNotFound(_) => "OFFER_NOT_FOUND",
            Self::OfferExpired(_) => "OFFER_EXPIRED",
            Self::OfferAlreadyClaimed(_) => "OFFER_ALREADY_CLAIMED",
            Self::ItemNotFound(_) => "ITEM_NOT_FOUND",
            Self::ItemUnavailable { .. } => "ITEM_UNAVAILABLE",
            Self::ExchangeNotFound(_) => "EXCHANGE_NOT_FOUND",
            Self::CodeNotFound(_) => "CODE_NOT_FOUND",
            Self::AlreadyRedeemed(_) => "ALREADY_REDEEMED",
            Self::CodeExpired(_) => "CODE_EXPIRED",
            Self::AlreadyCancelled(_) => "ALREADY_CANCELLED",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

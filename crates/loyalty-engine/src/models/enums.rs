//! 引擎枚举类型定义
//!
//! 所有枚举都支持 JSON（serde）序列化。状态机类枚举自带转移表，
//! 非法转移在类型层面被拒绝，而不是在各调用点临时判断。

use serde::{Deserialize, Serialize};

/// 全局忠诚度等级
///
/// 变体按等级从低到高声明，派生的 `Ord` 即等级高低，
/// 等级只升不降的判断直接用比较运算符表达。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// 探索者 - 默认等级，无条件
    #[default]
    Explorer,
    /// 入门 - 首次购买或积累 100 积分
    Initiate,
    /// 忠实 - 持续消费且跨月活跃
    Loyal,
    /// VIP - 高额消费且有成功推荐
    Vip,
    /// 大使 - 长期活跃的推广者
    Ambassador,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Explorer => "Explorer",
            Self::Initiate => "Initiate",
            Self::Loyal => "Loyal",
            Self::Vip => "VIP",
            Self::Ambassador => "Ambassador",
        };
        write!(f, "{s}")
    }
}

/// 商户子等级
///
/// 只看单一商户处的购买次数，与全局等级相互独立。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MerchantTier {
    #[default]
    Bronze,
    Silver,
    Gold,
}

impl MerchantTier {
    /// 按该商户处的购买次数推导子等级
    pub fn for_purchase_count(purchase_count: u32) -> Self {
        if purchase_count > 5 {
            Self::Gold
        } else if purchase_count >= 3 {
            Self::Silver
        } else {
            Self::Bronze
        }
    }
}

impl std::fmt::Display for MerchantTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Bronze => "Bronze",
            Self::Silver => "Silver",
            Self::Gold => "Gold",
        };
        write!(f, "{s}")
    }
}

/// 兑换记录状态
///
/// 状态机：`Confirmed -> Redeemed | Expired | Cancelled`，
/// 三个目标状态均为吸收态。`Pending` 为预留的创建前状态，当前
/// 兑换流程直接以 `Confirmed` 建单。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeStatus {
    Pending,
    #[default]
    Confirmed,
    Redeemed,
    Expired,
    Cancelled,
}

impl ExchangeStatus {
    /// 是否为终态（不再允许任何转移）
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Redeemed | Self::Expired | Self::Cancelled)
    }

    /// 状态转移表
    ///
    /// 取消允许从 Expired 发起：过期未用的兑换仍可退还积分。
    pub fn can_transition_to(&self, target: ExchangeStatus) -> bool {
        use ExchangeStatus::*;
        matches!(
            (self, target),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Redeemed)
                | (Confirmed, Expired)
                | (Confirmed, Cancelled)
                | (Expired, Cancelled)
        )
    }
}

impl std::fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Redeemed => "REDEEMED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// 兑换物品分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCategory {
    FoodDrink,
    Merchandise,
    Services,
    Experiences,
    GiftCards,
}

/// 应用页面
///
/// 「探索者」徽章要求访问全部三个页面。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Screen {
    Rewards,
    Badges,
    ConvertRewards,
}

impl Screen {
    pub const ALL: [Screen; 3] = [Self::Rewards, Self::Badges, Self::ConvertRewards];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rewards => "Rewards",
            Self::Badges => "Badges",
            Self::ConvertRewards => "ConvertRewards",
        }
    }

    /// 按页面名解析（客户端上报的自由字符串）
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Rewards" => Some(Self::Rewards),
            "Badges" => Some(Self::Badges),
            "ConvertRewards" => Some(Self::ConvertRewards),
            _ => None,
        }
    }
}

/// 成就徽章
///
/// 每个徽章的判定条件单调（一旦满足不会回退），奖励一次性发放。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Badge {
    /// 首次扫码
    FirstSteps,
    /// 扫描 5 个不同的码
    DedicatedScanner,
    /// 连续 3 天活跃
    DailyUser,
    /// 访问全部页面
    Explorer,
    /// 累计扫码 10 次
    Marathoner,
}

impl Badge {
    pub const ALL: [Badge; 5] = [
        Self::FirstSteps,
        Self::DedicatedScanner,
        Self::DailyUser,
        Self::Explorer,
        Self::Marathoner,
    ];

    /// 展示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::FirstSteps => "First Steps",
            Self::DedicatedScanner => "Dedicated Scanner",
            Self::DailyUser => "Daily User",
            Self::Explorer => "Explorer",
            Self::Marathoner => "Marathoner",
        }
    }

    /// 一次性奖励积分
    pub fn bonus(&self) -> u64 {
        match self {
            Self::FirstSteps => 50,
            Self::DedicatedScanner => 100,
            Self::DailyUser => 150,
            Self::Explorer => 75,
            Self::Marathoner => 250,
        }
    }
}

impl std::fmt::Display for Badge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// 通知状态
///
/// 显式状态枚举，替代布尔 `read` 标记。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationState {
    #[default]
    Unread,
    Read,
}

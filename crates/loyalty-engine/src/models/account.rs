//! 账户聚合
//!
//! 账户是引擎最核心的聚合：积分余额、等级进度、商户子等级、
//! 徽章与活动计数器、推荐关系、站内通知都挂在同一聚合下，
//! 保证「读-改-写」在一次原子提交内完成。

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Badge, NotificationState, Screen, Tier};
use super::merchant::MerchantLoyalty;

/// 等级进度计数器
///
/// `tier` 永远由这些计数器推导，不允许独立设置。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyProgress {
    /// 累计获得的积分（只增不减，扣减不回退此计数）
    pub total_points: u64,
    /// 累计购买次数
    pub purchase_count: u32,
    /// 不同活跃月份数（按 (年, 月) 去重）
    pub unique_activity_months: u32,
    /// 成功推荐人数（按被推荐账户去重）
    pub successful_referrals: u32,
    /// 最近一次等级变更时间（等级未变时不更新）
    pub last_tier_update: Option<DateTime<Utc>>,
}

/// 推荐奖励流水
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralReward {
    /// 奖励对应的另一方账户（推荐人视角为被推荐人，反之亦然）
    pub beneficiary_id: String,
    pub points_earned: u64,
    pub date: DateTime<Utc>,
}

/// 站内通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub state: NotificationState,
    pub created_at: DateTime<Utc>,
}

/// 账户聚合
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub display_name: String,
    /// 积分余额，扣减永远先校验，结构上不可能为负
    pub point_balance: u64,
    /// 全局等级（由 progress 推导，只升不降）
    pub tier: Tier,
    pub progress: LoyaltyProgress,
    /// 商户子等级，键为 merchant_id，创建后不删除
    pub merchant_tiers: HashMap<String, MerchantLoyalty>,
    /// 徽章授予标记
    pub badges: BTreeMap<Badge, bool>,

    // 活动计数器 — 徽章判定与活跃月份统计的数据源
    pub total_scans: u32,
    pub scanned_codes: HashSet<String>,
    /// 活跃日期集合（购买与扫码共同写入，天级去重）
    pub activity_dates: BTreeSet<NaiveDate>,
    pub visited_screens: HashSet<String>,

    // 推荐关系
    pub referral_code: Option<String>,
    pub referred_by: Option<String>,
    pub referral_validated: bool,
    pub referral_rewards: Vec<ReferralReward>,
    /// 被本账户成功推荐的账户列表
    pub referrals: Vec<String>,

    pub notifications: Vec<Notification>,
    pub last_points_activity: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// 创建新账户
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        let badges = Badge::ALL.iter().map(|b| (*b, false)).collect();
        Self {
            id: id.into(),
            display_name: display_name.into(),
            point_balance: 0,
            tier: Tier::default(),
            progress: LoyaltyProgress::default(),
            merchant_tiers: HashMap::new(),
            badges,
            total_scans: 0,
            scanned_codes: HashSet::new(),
            activity_dates: BTreeSet::new(),
            visited_screens: HashSet::new(),
            referral_code: None,
            referred_by: None,
            referral_validated: false,
            referral_rewards: Vec::new(),
            referrals: Vec::new(),
            notifications: Vec::new(),
            last_points_activity: None,
            created_at: now,
        }
    }

    /// 是否已获得指定徽章
    pub fn has_badge(&self, badge: Badge) -> bool {
        self.badges.get(&badge).copied().unwrap_or(false)
    }

    /// 记录一个活跃日期并刷新活跃月份计数
    pub fn record_activity_date(&mut self, date: NaiveDate) {
        self.activity_dates.insert(date);
        self.progress.unique_activity_months = self.unique_activity_months();
    }

    /// 不同活跃月份数：activity_dates 中去重的 (年, 月) 对
    pub fn unique_activity_months(&self) -> u32 {
        let months: BTreeSet<(i32, u32)> = self
            .activity_dates
            .iter()
            .map(|d| (d.year(), d.month()))
            .collect();
        months.len() as u32
    }

    /// 最长连续活跃天数
    ///
    /// 按日期升序扫描：相邻日期恰好相差 1 天则延续连击，
    /// 任何其他间隔都把连击重置为 1。
    pub fn max_consecutive_activity_days(&self) -> u32 {
        let mut max_run: u32 = 0;
        let mut run: u32 = 0;
        let mut prev: Option<NaiveDate> = None;

        for date in &self.activity_dates {
            run = match prev {
                Some(p) if (*date - p).num_days() == 1 => run + 1,
                _ => 1,
            };
            max_run = max_run.max(run);
            prev = Some(*date);
        }

        max_run
    }

    /// 是否访问过全部必访页面
    pub fn visited_all_screens(&self) -> bool {
        Screen::ALL
            .iter()
            .all(|s| self.visited_screens.contains(s.as_str()))
    }

    /// 追加一条未读站内通知
    pub fn push_notification(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.notifications.push(Notification {
            id: Uuid::now_v7().to_string(),
            message: message.into(),
            state: NotificationState::Unread,
            created_at: now,
        });
    }
}

//! 徽章成就追踪
//!
//! 五枚徽章的判定条件全部单调：一旦满足不会因后续活动回退。
//! 隐式判定（记录扫码/页面访问时顺带评估）与显式领取共用同一个
//! 检查-设置授予函数，且都发生在账户聚合的一次原子更新内——
//! 两条路径竞争时奖励也只会发放一次。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loyalty_shared::events::{EventEnvelope, EventSink, LoyaltyEvent};
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::{EngineError, Result};
use crate::ledger::apply_credit;
use crate::models::{Account, Badge};
use crate::store::LoyaltyStore;
use crate::tier::apply_tier;

/// 徽章判定条件
///
/// 从账户活动计数器求值，所有条件只增不减。
fn predicate_satisfied(account: &Account, badge: Badge) -> bool {
    match badge {
        Badge::FirstSteps => account.total_scans >= 1,
        Badge::DedicatedScanner => account.scanned_codes.len() >= 5,
        Badge::DailyUser => account.max_consecutive_activity_days() >= 3,
        Badge::Explorer => account.visited_all_screens(),
        Badge::Marathoner => account.total_scans >= 10,
    }
}

/// 授予单枚徽章（检查-设置）
///
/// 已授予时返回 None；否则置位、发放奖励并返回待发布事件。
/// 这是系统内唯一的徽章置位点。
fn grant_badge(
    account: &mut Account,
    badge: Badge,
    now: DateTime<Utc>,
) -> Result<Option<Vec<LoyaltyEvent>>> {
    if account.has_badge(badge) {
        return Ok(None);
    }

    account.badges.insert(badge, true);
    let (_, credit_event) = apply_credit(account, badge.bonus(), "badge", now)?;
    account.push_notification(
        format!("恭喜获得「{}」徽章，奖励 {} 积分！", badge, badge.bonus()),
        now,
    );

    Ok(Some(vec![
        LoyaltyEvent::BadgeAwarded {
            account_id: account.id.clone(),
            badge: badge.display_name().to_string(),
            bonus: badge.bonus(),
        },
        credit_event,
    ]))
}

/// 评估全部徽章并授予新满足的
///
/// 返回本次新授予的徽章与待发布事件；最后统一做一次等级重算。
fn evaluate_and_award(
    account: &mut Account,
    now: DateTime<Utc>,
) -> Result<(Vec<Badge>, Vec<LoyaltyEvent>)> {
    let mut awarded = Vec::new();
    let mut events = Vec::new();

    for badge in Badge::ALL {
        if predicate_satisfied(account, badge)
            && let Some(badge_events) = grant_badge(account, badge, now)?
        {
            awarded.push(badge);
            events.extend(badge_events);
        }
    }

    if !awarded.is_empty() {
        events.extend(apply_tier(account, now));
    }
    Ok((awarded, events))
}

/// 徽章进度报告条目
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeProgress {
    pub badge: Badge,
    pub name: String,
    pub earned: bool,
    pub progress: String,
    pub bonus: u64,
}

/// 徽章成就服务
pub struct BadgeAchievementTracker {
    store: Arc<LoyaltyStore>,
    sink: Arc<dyn EventSink>,
}

impl BadgeAchievementTracker {
    pub fn new(store: Arc<LoyaltyStore>, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    /// 记录一次扫码
    ///
    /// 总扫码数递增、扫码对象与活跃日期去重记录，随后在同一原子更新内
    /// 评估并授予新满足的徽章。返回本次新授予的徽章。
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn record_scan(
        &self,
        account_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Badge>> {
        let code_owned = code.to_string();
        let (awarded, events) = self.store.accounts.update(account_id, |account| {
            account.total_scans += 1;
            account.scanned_codes.insert(code_owned.clone());
            account.record_activity_date(now.date_naive());
            evaluate_and_award(account, now)
        })?;

        if !awarded.is_empty() {
            info!(account_id, ?awarded, "扫码触发徽章授予");
        }
        self.publish_all(events).await;
        Ok(awarded)
    }

    /// 记录一次页面访问
    #[instrument(skip(self), fields(account_id = %account_id, screen = %screen))]
    pub async fn record_screen_visit(
        &self,
        account_id: &str,
        screen: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Badge>> {
        let screen_owned = screen.to_string();
        let (awarded, events) = self.store.accounts.update(account_id, |account| {
            account.visited_screens.insert(screen_owned.clone());
            evaluate_and_award(account, now)
        })?;

        if !awarded.is_empty() {
            info!(account_id, ?awarded, "页面访问触发徽章授予");
        }
        self.publish_all(events).await;
        Ok(awarded)
    }

    /// 显式领取徽章
    ///
    /// 已授予报 `AlreadyAwarded`，条件未满足报 `BadgeNotEligible`；
    /// 否则走与隐式判定相同的检查-设置授予路径。
    #[instrument(skip(self), fields(account_id = %account_id, badge = %badge))]
    pub async fn award_badge(
        &self,
        account_id: &str,
        badge: Badge,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let events = self.store.accounts.update(account_id, |account| {
            if account.has_badge(badge) {
                return Err(EngineError::AlreadyAwarded {
                    badge: badge.display_name().to_string(),
                });
            }
            if !predicate_satisfied(account, badge) {
                return Err(EngineError::BadgeNotEligible {
                    badge: badge.display_name().to_string(),
                });
            }

            let mut events = grant_badge(account, badge, now)?.unwrap_or_default();
            events.extend(apply_tier(account, now));
            Ok(events)
        })?;

        info!(account_id, badge = %badge, "徽章已显式领取");
        self.publish_all(events).await;
        Ok(())
    }

    /// 徽章进度报告
    pub async fn badge_progress(&self, account_id: &str) -> Result<Vec<BadgeProgress>> {
        let account = self.store.accounts.get_required(account_id)?;

        let progress_of = |badge: Badge| -> String {
            match badge {
                Badge::FirstSteps => format!("{}/1", account.total_scans.min(1)),
                Badge::DedicatedScanner => format!("{}/5", account.scanned_codes.len().min(5)),
                Badge::DailyUser => {
                    format!("{}/3 days", account.max_consecutive_activity_days().min(3))
                }
                Badge::Explorer => {
                    let visited = crate::models::Screen::ALL
                        .iter()
                        .filter(|s| account.visited_screens.contains(s.as_str()))
                        .count();
                    format!("{visited}/3 screens")
                }
                Badge::Marathoner => format!("{}/10", account.total_scans.min(10)),
            }
        };

        Ok(Badge::ALL
            .iter()
            .map(|badge| BadgeProgress {
                badge: *badge,
                name: badge.display_name().to_string(),
                earned: account.has_badge(*badge),
                progress: progress_of(*badge),
                bonus: badge.bonus(),
            })
            .collect())
    }

    async fn publish_all(&self, events: Vec<LoyaltyEvent>) {
        for event in events {
            self.sink.publish(EventEnvelope::new(event)).await;
        }
    }
}

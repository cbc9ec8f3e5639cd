//! 全局等级引擎
//!
//! 等级由进度计数器纯函数推导，规则表按等级从低到高排列逐条求值，
//! 最后一条满足的规则生效（等价于：全部条件成立的最高等级）。
//! 等级应用采取只升不降语义：推导结果低于当前存储等级时不回退。
//!
//! 引擎内所有修改进度的路径（累积、推荐、徽章）都收敛到
//! `apply_tier` 这一个应用点。

use chrono::{DateTime, Utc};
use loyalty_shared::events::LoyaltyEvent;

use crate::models::{Account, LoyaltyProgress, Tier};

/// 从进度计数器推导等级
///
/// 纯函数，同样的输入永远得到同样的等级。
pub fn derive_tier(progress: &LoyaltyProgress) -> Tier {
    let mut tier = Tier::Explorer;

    // 规则按等级升序排列，后面满足的规则覆盖前面的结果
    if progress.purchase_count >= 1 || progress.total_points >= 100 {
        tier = Tier::Initiate;
    }
    if progress.total_points >= 500
        && progress.purchase_count >= 3
        && progress.unique_activity_months >= 3
    {
        tier = Tier::Loyal;
    }
    if progress.total_points >= 2000
        && progress.purchase_count >= 8
        && progress.unique_activity_months >= 6
        && progress.successful_referrals >= 1
    {
        tier = Tier::Vip;
    }
    if progress.total_points >= 5000
        && progress.purchase_count >= 15
        && progress.unique_activity_months >= 12
        && progress.successful_referrals >= 3
    {
        tier = Tier::Ambassador;
    }

    tier
}

/// 在账户上应用等级推导结果
///
/// 推导结果高于当前等级时晋升并更新 `last_tier_update`，
/// 返回等级变更事件；持平或更低时不做任何修改。
pub(crate) fn apply_tier(account: &mut Account, now: DateTime<Utc>) -> Option<LoyaltyEvent> {
    let derived = derive_tier(&account.progress);
    if derived <= account.tier {
        return None;
    }

    let old_tier = account.tier;
    account.tier = derived;
    account.progress.last_tier_update = Some(now);

    Some(LoyaltyEvent::TierChanged {
        account_id: account.id.clone(),
        old_tier: old_tier.to_string(),
        new_tier: derived.to_string(),
    })
}

//! 积分账本
//!
//! 账户积分余额的唯一修改入口。`apply_credit` / `apply_debit` 是在
//! 聚合更新闭包内使用的纯变更原语，返回待发布事件；`PointsLedger`
//! 服务把原语包装成独立的原子操作。其他服务（累积、推荐、徽章、兑换）
//! 在各自的原子更新内复用同一对原语，不允许绕过账本直接改余额。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loyalty_shared::events::{EventEnvelope, EventSink, LoyaltyEvent};
use tracing::{info, instrument};

use crate::error::{EngineError, Result};
use crate::models::Account;
use crate::store::LoyaltyStore;
use crate::tier;

/// 入账原语
///
/// 校验金额为正后增加余额与累计积分，刷新最近积分活动时间。
/// 返回新余额与待发布的余额变更事件。
pub(crate) fn apply_credit(
    account: &mut Account,
    amount: u64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(u64, LoyaltyEvent)> {
    if amount == 0 {
        return Err(EngineError::InvalidAmount { amount });
    }

    account.point_balance += amount;
    account.progress.total_points += amount;
    account.last_points_activity = Some(now);

    let event = LoyaltyEvent::PointsBalanceChanged {
        account_id: account.id.clone(),
        delta: amount as i64,
        new_balance: account.point_balance,
        reason: reason.to_string(),
    };
    Ok((account.point_balance, event))
}

/// 扣减原语
///
/// 余额不足时拒绝且不产生任何修改。累计积分 `total_points` 不回退，
/// 它是等级进度的「历史获得」口径而非余额镜像。
pub(crate) fn apply_debit(
    account: &mut Account,
    amount: u64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(u64, LoyaltyEvent)> {
    if amount == 0 {
        return Err(EngineError::InvalidAmount { amount });
    }
    if account.point_balance < amount {
        return Err(EngineError::InsufficientPoints {
            required: amount,
            actual: account.point_balance,
        });
    }

    account.point_balance -= amount;
    account.last_points_activity = Some(now);

    let event = LoyaltyEvent::PointsBalanceChanged {
        account_id: account.id.clone(),
        delta: -(amount as i64),
        new_balance: account.point_balance,
        reason: reason.to_string(),
    };
    Ok((account.point_balance, event))
}

/// 积分账本服务
pub struct PointsLedger {
    store: Arc<LoyaltyStore>,
    sink: Arc<dyn EventSink>,
}

impl PointsLedger {
    pub fn new(store: Arc<LoyaltyStore>, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    /// 入账
    ///
    /// 在账户聚合的一次原子更新内完成入账与等级重算，提交后发布事件。
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn credit(&self, account_id: &str, amount: u64, reason: &str) -> Result<u64> {
        let now = Utc::now();
        let (balance, events) = self.store.accounts.update(account_id, |account| {
            let (balance, credit_event) = apply_credit(account, amount, reason, now)?;
            let mut events = vec![credit_event];
            // 入账改变了 total_points，等级在同一原子更新内重算
            events.extend(tier::apply_tier(account, now));
            Ok((balance, events))
        })?;

        info!(account_id, amount, reason, new_balance = balance, "积分已入账");
        self.publish_all(events).await;
        Ok(balance)
    }

    /// 扣减
    ///
    /// 余额不足时整体拒绝。扣减不影响等级进度，无需等级重算。
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn debit(&self, account_id: &str, amount: u64, reason: &str) -> Result<u64> {
        let now = Utc::now();
        let (balance, event) = self
            .store
            .accounts
            .update(account_id, |account| apply_debit(account, amount, reason, now))?;

        info!(account_id, amount, reason, new_balance = balance, "积分已扣减");
        self.sink.publish(EventEnvelope::new(event)).await;
        Ok(balance)
    }

    /// 查询余额
    pub async fn balance(&self, account_id: &str) -> Result<u64> {
        Ok(self.store.accounts.get_required(account_id)?.point_balance)
    }

    /// 商户手动调整积分
    ///
    /// 商户后台的人工补发，不叠加特惠倍率。商户积分计划关闭时拒绝。
    #[instrument(skip(self), fields(merchant_id = %merchant_id, account_id = %account_id))]
    pub async fn adjust_manual(
        &self,
        merchant_id: &str,
        account_id: &str,
        amount: u64,
    ) -> Result<u64> {
        let program_enabled = self
            .store
            .merchants
            .get(merchant_id)
            .map(|config| config.program_enabled)
            .unwrap_or(false);
        if !program_enabled {
            return Err(EngineError::ProgramDisabled {
                merchant_id: merchant_id.to_string(),
            });
        }

        self.credit(account_id, amount, "manual-adjust").await
    }

    async fn publish_all(&self, events: Vec<LoyaltyEvent>) {
        for event in events {
            self.sink.publish(EventEnvelope::new(event)).await;
        }
    }
}

//! 推荐奖励链
//!
//! 注册时生成唯一推荐码；新账户携带推荐码注册时，推荐人与被推荐人
//! 各自获得一次性奖励。两侧是两个独立的单账户原子更新，不构成跨账户
//! 事务：被推荐侧已入账而推荐侧尚未提交的中间状态是被容忍的。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loyalty_shared::config::EngineConfig;
use loyalty_shared::events::{EventEnvelope, EventSink, LoyaltyEvent};
use rand::Rng;
use tracing::{info, instrument, warn};

use crate::error::{EngineError, Result};
use crate::ledger::apply_credit;
use crate::models::{Account, ReferralReward};
use crate::store::LoyaltyStore;
use crate::tier::apply_tier;

/// 推荐码前缀长度（取自展示名的字母数字字符）
const CODE_PREFIX_LEN: usize = 2;

/// 推荐奖励服务
pub struct ReferralRewardChain {
    store: Arc<LoyaltyStore>,
    sink: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl ReferralRewardChain {
    pub fn new(store: Arc<LoyaltyStore>, sink: Arc<dyn EventSink>, config: EngineConfig) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    /// 注册新账户
    ///
    /// 为新账户生成唯一推荐码；携带了推荐码时在注册内应用推荐奖励。
    /// 无效推荐码让整个注册失败，不会留下半注册的账户。
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn register_account(
        &self,
        account_id: &str,
        display_name: &str,
        referral_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        // 先校验推荐码，避免创建账户后才发现注册必然失败
        if let Some(code) = referral_code
            && self.store.referral_codes.resolve(code).is_none()
        {
            return Err(EngineError::InvalidReferralCode(code.to_string()));
        }

        let own_code = self.generate_code(display_name, account_id);

        let mut account = Account::new(account_id, display_name, now);
        account.referral_code = Some(own_code.clone());
        if let Err(e) = self.store.accounts.insert_new(account_id, account) {
            // 注册失败时释放刚预留的推荐码
            self.store.referral_codes.release(&own_code);
            return Err(e);
        }

        info!(account_id, referral_code = %own_code, "账户已注册");

        if let Some(code) = referral_code {
            self.apply_referral(account_id, code, now).await?;
        }

        self.store.accounts.get_required(account_id)
    }

    /// 生成唯一推荐码
    ///
    /// 展示名剔除非字母数字字符并大写后取前缀，拼接 3 位随机数。
    /// 以随机后缀循环尝试直到预留成功；冲突概率低，循环预期很快结束。
    pub fn generate_code(&self, display_name: &str, account_id: &str) -> String {
        let prefix: String = display_name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(CODE_PREFIX_LEN)
            .collect::<String>()
            .to_uppercase();

        let mut rng = rand::rng();
        loop {
            let suffix: u32 = rng.random_range(100..1000);
            let candidate = format!("{prefix}{suffix}");
            if self.store.referral_codes.try_reserve(&candidate, account_id) {
                return candidate;
            }
        }
    }

    /// 应用推荐奖励
    ///
    /// 推荐人：+referrer_bonus、新增被推荐账户、成功推荐数按推荐列表
    /// 去重口径重算；被推荐人：+referee_bonus、标记推荐关系已验证。
    /// 两侧都在各自账户的一次原子更新内完成入账与等级重算。
    #[instrument(skip(self), fields(new_account_id = %new_account_id))]
    pub async fn apply_referral(
        &self,
        new_account_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let referrer_id = self
            .store
            .referral_codes
            .resolve(code)
            .ok_or_else(|| EngineError::InvalidReferralCode(code.to_string()))?;

        if referrer_id == new_account_id {
            return Err(EngineError::Validation(
                "不能使用自己的推荐码注册".to_string(),
            ));
        }
        // 被推荐账户必须存在，先读一次让 AccountNotFound 在任何入账前暴露
        self.store.accounts.get_required(new_account_id)?;

        let referrer_bonus = self.config.referrer_bonus;
        let referee_bonus = self.config.referee_bonus;

        // 推荐人侧
        let referee_owned = new_account_id.to_string();
        let (referrer_name, referrer_events) =
            self.store.accounts.update(&referrer_id, |account| {
                let (_, credit_event) =
                    apply_credit(account, referrer_bonus, "referral-referrer", now)?;
                let mut events = vec![credit_event];

                if !account.referrals.contains(&referee_owned) {
                    account.referrals.push(referee_owned.clone());
                }
                account.referral_rewards.push(ReferralReward {
                    beneficiary_id: referee_owned.clone(),
                    points_earned: referrer_bonus,
                    date: now,
                });
                // 成功推荐数 = 被推荐账户去重数，而非奖励流水条数
                account.progress.successful_referrals = account.referrals.len() as u32;
                account.push_notification(
                    format!("有新用户通过您的推荐码注册，奖励 {referrer_bonus} 积分！"),
                    now,
                );
                events.extend(apply_tier(account, now));
                Ok((account.display_name.clone(), events))
            })?;

        // 被推荐人侧 — 独立的原子更新；此处失败时推荐侧已入账，按容忍的
        // 部分完成处理并记录告警，由对账流程兜底
        let referrer_owned = referrer_id.clone();
        let referee_result = self.store.accounts.update(new_account_id, |account| {
            let (_, credit_event) = apply_credit(account, referee_bonus, "referral-referee", now)?;
            let mut events = vec![credit_event];

            account.referred_by = Some(referrer_owned.clone());
            account.referral_validated = true;
            account.referral_rewards.push(ReferralReward {
                beneficiary_id: referrer_owned.clone(),
                points_earned: referee_bonus,
                date: now,
            });
            account.push_notification(
                format!("欢迎加入！通过 {referrer_name} 的推荐您获得 {referee_bonus} 积分。"),
                now,
            );
            events.extend(apply_tier(account, now));
            Ok(events)
        });

        let referee_events = match referee_result {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    referrer_id = %referrer_id,
                    new_account_id,
                    error = %e,
                    "推荐奖励部分完成：推荐人已入账，被推荐人入账失败"
                );
                Vec::new()
            }
        };

        for event in referrer_events.into_iter().chain(referee_events) {
            self.sink.publish(EventEnvelope::new(event)).await;
        }
        self.sink
            .publish(EventEnvelope::new(LoyaltyEvent::ReferralRewarded {
                referrer_id: referrer_id.clone(),
                referee_id: new_account_id.to_string(),
                referrer_points: referrer_bonus,
                referee_points: referee_bonus,
            }))
            .await;

        info!(
            referrer_id = %referrer_id,
            new_account_id,
            "推荐奖励已发放"
        );
        Ok(())
    }
}

//! 兑换目录与兑换生命周期
//!
//! 兑换流程的并发关键点是限量物品的名额：名额在物品聚合的一次原子
//! 更新内「先占后结」（校验可兑换并递增计数），随后才扣减账户积分；
//! 扣减失败时释放名额作为补偿。两个并发请求争抢最后一个名额时，
//! 版本守卫保证只有一个能占到。
//!
//! 兑换码过期采用惰性检测：任何读到已过期 Confirmed 记录的路径都会
//! 先把状态迁移为 Expired 再报错——状态变更先于错误返回是刻意行为。
//! 另提供显式清扫供定时任务使用。

use std::sync::Arc;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use loyalty_shared::config::EngineConfig;
use loyalty_shared::events::{EventEnvelope, EventSink, LoyaltyEvent};
use rand::Rng;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::ledger::{apply_credit, apply_debit};
use crate::models::{ExchangeStats, ExchangeStatus, PointExchange, RedemptionItem};
use crate::store::LoyaltyStore;

/// 兑换码字符表（大写字母 + 数字）
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// 兑换码长度
const CODE_LEN: usize = 8;

/// 兑换码格式
static CODE_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{8}$").expect("兑换码正则字面量合法"));

/// 校验字符串是否为合法兑换码格式
pub fn is_valid_code_format(code: &str) -> bool {
    CODE_FORMAT.is_match(code)
}

/// 兑换服务
///
/// 兑换目录（RedemptionCatalog）与兑换交易（RedemptionExchange）的
/// 统一入口。
pub struct RedemptionExchange {
    store: Arc<LoyaltyStore>,
    sink: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl RedemptionExchange {
    pub fn new(store: Arc<LoyaltyStore>, sink: Arc<dyn EventSink>, config: EngineConfig) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    // ------------------------------------------------------------------
    // 目录
    // ------------------------------------------------------------------

    /// 上架兑换物品
    pub async fn add_item(&self, item: RedemptionItem) -> Result<()> {
        if item.points_required == 0 {
            return Err(EngineError::Validation(
                "points_required 必须至少为 1".to_string(),
            ));
        }
        let item_id = item.id.clone();
        self.store.items.insert_new(&item_id, item)?;
        info!(item_id = %item_id, "兑换物品已上架");
        Ok(())
    }

    /// 当前可兑换的物品，按所需积分升序
    pub async fn available_items(&self, now: DateTime<Utc>) -> Vec<RedemptionItem> {
        let mut items = self.store.items.list_by(|item| item.can_redeem(now));
        items.sort_by_key(|item| item.points_required);
        items
    }

    /// 查询单个物品
    pub async fn item(&self, item_id: &str) -> Result<RedemptionItem> {
        self.store.items.get_required(item_id)
    }

    // ------------------------------------------------------------------
    // 兑换生命周期
    // ------------------------------------------------------------------

    /// 用积分兑换物品
    ///
    /// 名额占用与积分扣减的顺序见模块文档。成功后创建 Confirmed 状态的
    /// 兑换记录，兑换码全局唯一，有效期从当前时刻起按配置天数计算。
    #[instrument(skip(self), fields(account_id = %account_id, item_id = %item_id))]
    pub async fn exchange(
        &self,
        account_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PointExchange> {
        // 账户缺失在任何名额占用前暴露
        self.store.accounts.get_required(account_id)?;

        // 1. 占名额：校验与计数递增在物品版本守卫下原子完成
        let points_required = self.store.items.update(item_id, |item| {
            if !item.can_redeem(now) {
                return Err(EngineError::ItemUnavailable {
                    item_id: item.id.clone(),
                    reason: item.unavailable_reason(now).to_string(),
                });
            }
            item.current_redemptions += 1;
            Ok(item.points_required)
        })?;

        // 2. 扣积分；失败则释放刚占下的名额
        let debit_result = self.store.accounts.update(account_id, |account| {
            apply_debit(account, points_required, "redemption", now)
        });
        let (_, debit_event) = match debit_result {
            Ok(ok) => ok,
            Err(e) => {
                self.release_slot(item_id).await;
                return Err(e);
            }
        };

        // 3. 生成兑换记录与全局唯一兑换码
        let exchange_id = Uuid::now_v7().to_string();
        let code = self.generate_redemption_code(&exchange_id);
        let exchange = PointExchange {
            id: exchange_id.clone(),
            account_id: account_id.to_string(),
            item_id: item_id.to_string(),
            points_used: points_required,
            status: ExchangeStatus::Confirmed,
            redemption_code: code.clone(),
            exchange_date: now,
            expiry_date: now + Duration::days(self.config.exchange_validity_days),
            redeemed_at: None,
            notes: None,
        };
        self.store.exchanges.insert_new(&exchange_id, exchange.clone())?;

        info!(
            account_id,
            item_id,
            exchange_id = %exchange_id,
            redemption_code = %code,
            points_used = points_required,
            "兑换成功"
        );

        self.sink.publish(EventEnvelope::new(debit_event)).await;
        self.sink
            .publish(EventEnvelope::new(LoyaltyEvent::ExchangeCompleted {
                account_id: account_id.to_string(),
                exchange_id,
                item_id: item_id.to_string(),
                points_used: points_required,
                redemption_code: code,
            }))
            .await;

        Ok(exchange)
    }

    /// 校验兑换码
    ///
    /// 已核销报 `AlreadyRedeemed`；已过期的 Confirmed 记录先迁移为
    /// Expired 再报 `CodeExpired`（状态变更被提交）；否则返回记录。
    #[instrument(skip(self))]
    pub async fn validate_code(&self, code: &str, now: DateTime<Utc>) -> Result<PointExchange> {
        let exchange_id = self
            .store
            .redemption_codes
            .resolve(code)
            .ok_or_else(|| EngineError::CodeNotFound(code.to_string()))?;

        let exchange = self.lazily_expire(&exchange_id, now)?;
        match exchange.status {
            ExchangeStatus::Redeemed => Err(EngineError::AlreadyRedeemed(exchange.id)),
            ExchangeStatus::Cancelled => Err(EngineError::AlreadyCancelled(exchange.id)),
            ExchangeStatus::Expired => Err(EngineError::CodeExpired(code.to_string())),
            ExchangeStatus::Pending | ExchangeStatus::Confirmed => Ok(exchange),
        }
    }

    /// 核销兑换
    ///
    /// 仅 Confirmed 状态可核销；过期的先迁移为 Expired 再报错。
    #[instrument(skip(self, notes))]
    pub async fn redeem(
        &self,
        exchange_id: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PointExchange> {
        let outcome = self.store.exchanges.update(exchange_id, |exchange| {
            if exchange.status == ExchangeStatus::Confirmed && exchange.is_expired(now) {
                // 惰性过期：状态迁移要提交，错误在提交后报告
                exchange.status = ExchangeStatus::Expired;
                return Ok(Err(EngineError::CodeExpired(
                    exchange.redemption_code.clone(),
                )));
            }

            match exchange.status {
                ExchangeStatus::Redeemed => Err(EngineError::AlreadyRedeemed(exchange.id.clone())),
                ExchangeStatus::Cancelled => {
                    Err(EngineError::AlreadyCancelled(exchange.id.clone()))
                }
                ExchangeStatus::Expired => Err(EngineError::CodeExpired(
                    exchange.redemption_code.clone(),
                )),
                ExchangeStatus::Pending => Err(EngineError::Validation(
                    "兑换尚未确认，不能核销".to_string(),
                )),
                ExchangeStatus::Confirmed => {
                    exchange.status = ExchangeStatus::Redeemed;
                    exchange.redeemed_at = Some(now);
                    if notes.is_some() {
                        exchange.notes = notes.clone();
                    }
                    Ok(Ok(exchange.clone()))
                }
            }
        })?;

        let exchange = outcome?;
        info!(exchange_id, code = %exchange.redemption_code, "兑换已核销");
        Ok(exchange)
    }

    /// 取消兑换并退还积分
    ///
    /// Redeemed / Cancelled 为吸收态不可取消；其余状态（含 Expired）
    /// 取消后退还积分、物品名额计数回退（下限 0）。
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        exchange_id: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PointExchange> {
        let exchange = self.store.exchanges.update(exchange_id, |exchange| {
            match exchange.status {
                ExchangeStatus::Redeemed => {
                    Err(EngineError::AlreadyRedeemed(exchange.id.clone()))
                }
                ExchangeStatus::Cancelled => {
                    Err(EngineError::AlreadyCancelled(exchange.id.clone()))
                }
                _ => {
                    exchange.status = ExchangeStatus::Cancelled;
                    if reason.is_some() {
                        exchange.notes = reason.clone();
                    }
                    Ok(exchange.clone())
                }
            }
        })?;

        // 退积分。账户在取消前被删除属于数据异常：记录告警，取消本身保持成立
        let refund = self.store.accounts.update(&exchange.account_id, |account| {
            apply_credit(account, exchange.points_used, "redemption-cancel", now)
        });
        match refund {
            Ok((_, credit_event)) => {
                self.sink.publish(EventEnvelope::new(credit_event)).await;
            }
            Err(e) => {
                warn!(
                    exchange_id,
                    account_id = %exchange.account_id,
                    error = %e,
                    "取消退款失败：兑换已取消但积分未退回"
                );
            }
        }

        // 名额计数回退，下限 0
        let released = self.store.items.update(&exchange.item_id, |item| {
            item.current_redemptions = item.current_redemptions.saturating_sub(1);
            Ok(())
        });
        if let Err(e) = released {
            warn!(exchange_id, item_id = %exchange.item_id, error = %e, "名额回退失败");
        }

        info!(
            exchange_id,
            refunded_points = exchange.points_used,
            "兑换已取消"
        );
        self.sink
            .publish(EventEnvelope::new(LoyaltyEvent::ExchangeCancelled {
                account_id: exchange.account_id.clone(),
                exchange_id: exchange.id.clone(),
                refunded_points: exchange.points_used,
            }))
            .await;

        Ok(exchange)
    }

    /// 清扫过期兑换
    ///
    /// 把所有已过有效期的 Confirmed 记录迁移为 Expired，返回迁移条数。
    /// 惰性检测之外的兜底，供定时任务调用。
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let stale = self.store.exchanges.list_by(|exchange| {
            exchange.status == ExchangeStatus::Confirmed && exchange.is_expired(now)
        });

        let mut swept = 0;
        for exchange in stale {
            let result = self.store.exchanges.update(&exchange.id, |ex| {
                // 清扫与惰性检测竞争时以先到者为准
                if ex.status == ExchangeStatus::Confirmed && ex.is_expired(now) {
                    ex.status = ExchangeStatus::Expired;
                    Ok(true)
                } else {
                    Ok(false)
                }
            });
            if matches!(result, Ok(true)) {
                swept += 1;
            }
        }

        if swept > 0 {
            info!(swept, "过期兑换已清扫");
        }
        swept
    }

    // ------------------------------------------------------------------
    // 查询
    // ------------------------------------------------------------------

    /// 账户的兑换历史，按兑换时间倒序
    ///
    /// 读取前先对该账户的过期 Confirmed 记录做惰性迁移，
    /// 返回的快照不会出现「已过期却仍显示 Confirmed」的状态。
    pub async fn account_exchanges(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<PointExchange> {
        self.expire_stale_for(account_id, now);
        let mut exchanges = self
            .store
            .exchanges
            .list_by(|exchange| exchange.account_id == account_id);
        exchanges.sort_by(|a, b| b.exchange_date.cmp(&a.exchange_date));
        exchanges
    }

    /// 账户的兑换统计
    pub async fn exchange_stats(&self, account_id: &str, now: DateTime<Utc>) -> ExchangeStats {
        self.expire_stale_for(account_id, now);
        let exchanges = self
            .store
            .exchanges
            .list_by(|exchange| exchange.account_id == account_id);

        let mut stats = ExchangeStats {
            total_exchanges: exchanges.len() as u64,
            ..ExchangeStats::default()
        };
        for exchange in exchanges {
            stats.total_points_used += exchange.points_used;
            match exchange.status {
                ExchangeStatus::Pending => stats.pending += 1,
                ExchangeStatus::Confirmed => stats.confirmed += 1,
                ExchangeStatus::Redeemed => stats.redeemed += 1,
                ExchangeStatus::Expired => stats.expired += 1,
                ExchangeStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    // ------------------------------------------------------------------
    // 内部
    // ------------------------------------------------------------------

    /// 生成全局唯一兑换码
    ///
    /// 8 位大写字母数字随机码，以预留表循环尝试直到占用成功。
    fn generate_redemption_code(&self, exchange_id: &str) -> String {
        let mut rng = rand::rng();
        loop {
            let code: String = (0..CODE_LEN)
                .map(|_| {
                    let idx = rng.random_range(0..CODE_CHARSET.len());
                    CODE_CHARSET[idx] as char
                })
                .collect();
            debug_assert!(is_valid_code_format(&code));

            if self.store.redemption_codes.try_reserve(&code, exchange_id) {
                return code;
            }
        }
    }

    /// 对单个账户的过期 Confirmed 记录做惰性迁移
    fn expire_stale_for(&self, account_id: &str, now: DateTime<Utc>) {
        let stale = self.store.exchanges.list_by(|exchange| {
            exchange.account_id == account_id
                && exchange.status == ExchangeStatus::Confirmed
                && exchange.is_expired(now)
        });
        for exchange in stale {
            let _ = self.store.exchanges.update(&exchange.id, |ex| {
                if ex.status == ExchangeStatus::Confirmed && ex.is_expired(now) {
                    ex.status = ExchangeStatus::Expired;
                }
                Ok(())
            });
        }
    }

    /// 惰性过期检测
    ///
    /// 已过期的 Confirmed 记录迁移为 Expired 并提交，返回最新快照。
    fn lazily_expire(&self, exchange_id: &str, now: DateTime<Utc>) -> Result<PointExchange> {
        self.store.exchanges.update(exchange_id, |exchange| {
            if exchange.status == ExchangeStatus::Confirmed && exchange.is_expired(now) {
                exchange.status = ExchangeStatus::Expired;
            }
            Ok(exchange.clone())
        })
    }

    /// 释放占用的名额（扣款失败的补偿路径）
    async fn release_slot(&self, item_id: &str) {
        let result = self.store.items.update(item_id, |item| {
            item.current_redemptions = item.current_redemptions.saturating_sub(1);
            Ok(())
        });
        if let Err(e) = result {
            warn!(item_id, error = %e, "兑换名额补偿释放失败");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, ItemCategory};
    use loyalty_shared::events::RecordingEventSink;

    fn setup() -> (Arc<LoyaltyStore>, Arc<RecordingEventSink>, RedemptionExchange) {
        let store = Arc::new(LoyaltyStore::new());
        let sink = Arc::new(RecordingEventSink::new());
        let service = RedemptionExchange::new(
            Arc::clone(&store),
            sink.clone() as Arc<dyn EventSink>,
            EngineConfig::default(),
        );
        (store, sink, service)
    }

    fn seed_account(store: &LoyaltyStore, id: &str, balance: u64) {
        let mut account = Account::new(id, "Test", Utc::now());
        account.point_balance = balance;
        store.accounts.insert_new(id, account).unwrap();
    }

    fn test_item(id: &str, points: u64, max: Option<u32>) -> RedemptionItem {
        RedemptionItem {
            id: id.to_string(),
            title: "测试物品".to_string(),
            description: "desc".to_string(),
            points_required: points,
            category: ItemCategory::Merchandise,
            is_available: true,
            max_redemptions: max,
            current_redemptions: 0,
            expiry_date: None,
            terms: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_exchange_happy_path() {
        // 场景 D 前半：余额 500、物品 300 -> 余额 200、计数 1
        let (store, _sink, service) = setup();
        seed_account(&store, "acc-1", 500);
        service.add_item(test_item("itm-1", 300, Some(1))).await.unwrap();
        let now = Utc::now();

        let exchange = service.exchange("acc-1", "itm-1", now).await.unwrap();

        assert_eq!(exchange.status, ExchangeStatus::Confirmed);
        assert_eq!(exchange.points_used, 300);
        assert!(is_valid_code_format(&exchange.redemption_code));
        assert_eq!(exchange.expiry_date, now + Duration::days(30));

        assert_eq!(store.accounts.get("acc-1").unwrap().point_balance, 200);
        assert_eq!(store.items.get("itm-1").unwrap().current_redemptions, 1);
    }

    #[tokio::test]
    async fn test_exchange_capacity_exhausted() {
        // 场景 D 后半：第二个账户兑换已满物品报 ItemUnavailable
        let (store, _sink, service) = setup();
        seed_account(&store, "acc-1", 500);
        seed_account(&store, "acc-2", 500);
        service.add_item(test_item("itm-1", 300, Some(1))).await.unwrap();
        let now = Utc::now();

        service.exchange("acc-1", "itm-1", now).await.unwrap();
        let err = service.exchange("acc-2", "itm-1", now).await.unwrap_err();

        assert!(matches!(err, EngineError::ItemUnavailable { .. }));
        // 失败方余额不受影响
        assert_eq!(store.accounts.get("acc-2").unwrap().point_balance, 500);
    }

    #[tokio::test]
    async fn test_exchange_insufficient_points_releases_slot() {
        let (store, _sink, service) = setup();
        seed_account(&store, "acc-1", 100);
        service.add_item(test_item("itm-1", 300, Some(1))).await.unwrap();

        let err = service
            .exchange("acc-1", "itm-1", Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::InsufficientPoints { .. }));
        // 占用的名额被补偿释放
        assert_eq!(store.items.get("itm-1").unwrap().current_redemptions, 0);
    }

    #[tokio::test]
    async fn test_exchange_then_cancel_restores_everything() {
        // 往返性质：exchange 后立即 cancel，余额与名额精确还原
        let (store, _sink, service) = setup();
        seed_account(&store, "acc-1", 500);
        service.add_item(test_item("itm-1", 300, Some(5))).await.unwrap();
        let now = Utc::now();

        let exchange = service.exchange("acc-1", "itm-1", now).await.unwrap();
        let cancelled = service.cancel(&exchange.id, None, now).await.unwrap();

        assert_eq!(cancelled.status, ExchangeStatus::Cancelled);
        assert_eq!(store.accounts.get("acc-1").unwrap().point_balance, 500);
        assert_eq!(store.items.get("itm-1").unwrap().current_redemptions, 0);
    }

    #[tokio::test]
    async fn test_validate_and_redeem_lifecycle() {
        let (store, _sink, service) = setup();
        seed_account(&store, "acc-1", 500);
        service.add_item(test_item("itm-1", 300, None)).await.unwrap();
        let now = Utc::now();

        let exchange = service.exchange("acc-1", "itm-1", now).await.unwrap();

        // 校验通过
        let validated = service
            .validate_code(&exchange.redemption_code, now)
            .await
            .unwrap();
        assert_eq!(validated.id, exchange.id);

        // 核销
        let redeemed = service
            .redeem(&exchange.id, Some("门店核销".to_string()), now)
            .await
            .unwrap();
        assert_eq!(redeemed.status, ExchangeStatus::Redeemed);
        assert_eq!(redeemed.redeemed_at, Some(now));
        assert_eq!(redeemed.notes.as_deref(), Some("门店核销"));

        // 再次校验与核销都报已使用
        let err = service
            .validate_code(&exchange.redemption_code, now)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRedeemed(_)));

        let err = service.redeem(&exchange.id, None, now).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRedeemed(_)));

        // 已核销不可取消
        let err = service.cancel(&exchange.id, None, now).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRedeemed(_)));

        assert_eq!(store.accounts.get("acc-1").unwrap().point_balance, 200);
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let (_store, _sink, service) = setup();
        let err = service
            .validate_code("ZZZZ9999", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_lazy_expiry_on_validate_mutates_state() {
        let (store, _sink, service) = setup();
        seed_account(&store, "acc-1", 500);
        service.add_item(test_item("itm-1", 300, None)).await.unwrap();
        let now = Utc::now();

        let exchange = service.exchange("acc-1", "itm-1", now).await.unwrap();

        // 有效期之后校验：报 CodeExpired，且状态已被迁移提交
        let later = now + Duration::days(31);
        let err = service
            .validate_code(&exchange.redemption_code, later)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CodeExpired(_)));
        assert_eq!(
            store.exchanges.get(&exchange.id).unwrap().status,
            ExchangeStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_lazy_expiry_on_redeem() {
        let (store, _sink, service) = setup();
        seed_account(&store, "acc-1", 500);
        service.add_item(test_item("itm-1", 300, None)).await.unwrap();
        let now = Utc::now();

        let exchange = service.exchange("acc-1", "itm-1", now).await.unwrap();

        let later = now + Duration::days(31);
        let err = service.redeem(&exchange.id, None, later).await.unwrap_err();
        assert!(matches!(err, EngineError::CodeExpired(_)));
        assert_eq!(
            store.exchanges.get(&exchange.id).unwrap().status,
            ExchangeStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_expired_exchange_still_cancellable_with_refund() {
        let (store, _sink, service) = setup();
        seed_account(&store, "acc-1", 500);
        service.add_item(test_item("itm-1", 300, None)).await.unwrap();
        let now = Utc::now();

        let exchange = service.exchange("acc-1", "itm-1", now).await.unwrap();
        let later = now + Duration::days(31);

        // 先触发惰性过期
        let _ = service.validate_code(&exchange.redemption_code, later).await;

        // Expired 状态仍可取消并退款
        let cancelled = service.cancel(&exchange.id, None, later).await.unwrap();
        assert_eq!(cancelled.status, ExchangeStatus::Cancelled);
        assert_eq!(store.accounts.get("acc-1").unwrap().point_balance, 500);

        // 取消后不可再取消
        let err = service.cancel(&exchange.id, None, later).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyCancelled(_)));
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let (store, _sink, service) = setup();
        seed_account(&store, "acc-1", 1000);
        service.add_item(test_item("itm-1", 100, None)).await.unwrap();
        let now = Utc::now();

        let e1 = service.exchange("acc-1", "itm-1", now).await.unwrap();
        let e2 = service.exchange("acc-1", "itm-1", now).await.unwrap();
        // 第三单核销掉，不参与清扫
        let e3 = service.exchange("acc-1", "itm-1", now).await.unwrap();
        service.redeem(&e3.id, None, now).await.unwrap();

        let later = now + Duration::days(31);
        let swept = service.sweep_expired(later).await;

        assert_eq!(swept, 2);
        assert_eq!(
            store.exchanges.get(&e1.id).unwrap().status,
            ExchangeStatus::Expired
        );
        assert_eq!(
            store.exchanges.get(&e2.id).unwrap().status,
            ExchangeStatus::Expired
        );
        assert_eq!(
            store.exchanges.get(&e3.id).unwrap().status,
            ExchangeStatus::Redeemed
        );

        // 再次清扫无事可做
        assert_eq!(service.sweep_expired(later).await, 0);
    }

    #[tokio::test]
    async fn test_available_items_sorted_and_filtered() {
        let (_store, _sink, service) = setup();
        let now = Utc::now();

        service.add_item(test_item("itm-cheap", 100, None)).await.unwrap();
        service.add_item(test_item("itm-mid", 300, None)).await.unwrap();
        let mut unavailable = test_item("itm-off", 50, None);
        unavailable.is_available = false;
        service.add_item(unavailable).await.unwrap();
        let mut expired = test_item("itm-expired", 80, None);
        expired.expiry_date = Some(now - Duration::days(1));
        service.add_item(expired).await.unwrap();

        let items = service.available_items(now).await;
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["itm-cheap", "itm-mid"]);
    }

    #[tokio::test]
    async fn test_zero_point_item_rejected() {
        let (_store, _sink, service) = setup();
        let err = service.add_item(test_item("itm-1", 0, None)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_redemption_codes_unique() {
        let (_store, _sink, service) = setup();

        // 同一服务生成大量兑换码不出现重复
        let mut codes = std::collections::HashSet::new();
        for i in 0..200 {
            let code = service.generate_redemption_code(&format!("exc-{i}"));
            assert!(is_valid_code_format(&code));
            assert!(codes.insert(code), "兑换码出现重复");
        }
    }

    #[tokio::test]
    async fn test_exchange_stats() {
        let (store, _sink, service) = setup();
        seed_account(&store, "acc-1", 1000);
        service.add_item(test_item("itm-1", 100, None)).await.unwrap();
        let now = Utc::now();

        let e1 = service.exchange("acc-1", "itm-1", now).await.unwrap();
        let _e2 = service.exchange("acc-1", "itm-1", now).await.unwrap();
        let e3 = service.exchange("acc-1", "itm-1", now).await.unwrap();
        service.redeem(&e1.id, None, now).await.unwrap();
        service.cancel(&e3.id, None, now).await.unwrap();

        let stats = service.exchange_stats("acc-1", now).await;
        assert_eq!(stats.total_exchanges, 3);
        assert_eq!(stats.total_points_used, 300);
        assert_eq!(stats.redeemed, 1);
        assert_eq!(stats.confirmed, 1);
        assert_eq!(stats.cancelled, 1);

        let history = service.account_exchanges("acc-1", now).await;
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_events_on_exchange_and_cancel() {
        let (store, sink, service) = setup();
        seed_account(&store, "acc-1", 500);
        service.add_item(test_item("itm-1", 300, None)).await.unwrap();
        let now = Utc::now();

        let exchange = service.exchange("acc-1", "itm-1", now).await.unwrap();
        service.cancel(&exchange.id, None, now).await.unwrap();

        let events = sink.events();
        assert!(events.iter().any(|e| matches!(
            e,
            LoyaltyEvent::ExchangeCompleted { points_used: 300, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            LoyaltyEvent::PointsBalanceChanged { delta: -300, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            LoyaltyEvent::PointsBalanceChanged { delta: 300, reason, .. } if reason == "redemption-cancel"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            LoyaltyEvent::ExchangeCancelled { refunded_points: 300, .. }
        )));
    }
}

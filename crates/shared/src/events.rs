//! 事件模型与事件出口抽象
//!
//! 定义积分引擎消费的外部事件（订单确认、推荐注册、活动记录、兑换请求）
//! 以及引擎产出的领域事件（余额变更、等级变更、徽章授予等）。
//! `EventSink` trait 是引擎与外部通知系统之间的接缝：引擎只负责在状态
//! 提交后发布事件，投递渠道（推送、邮件）由订阅方实现。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EventType — 事件类型枚举
// ---------------------------------------------------------------------------

/// 引擎消费的事件类型
///
/// 按业务域划分为三类：交易（影响余额与等级进度）、互动（喂给徽章追踪器）、
/// 兑换（读写兑换目录与兑换记录）。分类用于路由与日志标注。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // 交易类事件 — 涉及积分发放，需要与订单/注册系统核对
    OrderConfirmed,
    ReferralRegistration,

    // 互动类事件 — 用户主动行为，驱动徽章与活跃月份统计
    ScanRecorded,
    ScreenVisited,

    // 兑换类事件 — 积分换购生命周期
    RedemptionRequest,
    RedemptionCodeLookup,
}

impl EventType {
    /// 交易类事件会改变积分余额，处理失败需要人工核对
    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::OrderConfirmed | Self::ReferralRegistration)
    }

    /// 互动类事件反映用户活跃度，是徽章授予的触发源
    pub fn is_engagement(&self) -> bool {
        matches!(self, Self::ScanRecorded | Self::ScreenVisited)
    }

    /// 兑换类事件读写兑换目录，受库存与有效期约束
    pub fn is_redemption(&self) -> bool {
        matches!(self, Self::RedemptionRequest | Self::RedemptionCodeLookup)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 序列化为 SCREAMING_SNAKE_CASE 保持与 serde 的一致性，便于日志统一引用
        let s = match self {
            Self::OrderConfirmed => "ORDER_CONFIRMED",
            Self::ReferralRegistration => "REFERRAL_REGISTRATION",
            Self::ScanRecorded => "SCAN_RECORDED",
            Self::ScreenVisited => "SCREEN_VISITED",
            Self::RedemptionRequest => "REDEMPTION_REQUEST",
            Self::RedemptionCodeLookup => "REDEMPTION_CODE_LOOKUP",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// 消费事件 — 由外部协作方（结算、认证、客户端）构造
// ---------------------------------------------------------------------------

/// 订单行
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: u32,
    pub price: f64,
    /// 自由文本分类标签，累积时做大小写/变音符号归一化后匹配商户配置
    pub category: String,
}

/// 订单确认事件
///
/// 由结算流程在支付成功后发出。引擎不校验支付，只负责积分累积。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmed {
    pub account_id: String,
    pub merchant_id: String,
    pub items: Vec<OrderLine>,
    pub total_amount: f64,
}

/// 推荐注册事件
///
/// 由认证流程在新账户注册成功后发出，推荐码可选。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRegistration {
    pub new_account_id: String,
    pub referral_code: Option<String>,
}

/// 活动类型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "kind")]
pub enum ActivityKind {
    /// 扫码（携带被扫对象的唯一标识，用于去重统计）
    Scan { code: String },
    /// 访问应用页面
    ScreenVisit { screen: String },
}

/// 活动记录事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecorded {
    pub account_id: String,
    #[serde(flatten)]
    pub activity: ActivityKind,
    pub timestamp: DateTime<Utc>,
}

/// 兑换请求事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRequest {
    pub account_id: String,
    pub item_id: String,
}

/// 兑换码查询事件（商户核销前的校验）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionCodeLookup {
    pub code: String,
}

// ---------------------------------------------------------------------------
// LoyaltyEvent — 引擎产出的领域事件
// ---------------------------------------------------------------------------

/// 引擎产出的领域事件
///
/// 所有事件在对应聚合的状态提交之后发布，订阅方（通知系统）据此推送消息。
/// 发布失败不回滚业务状态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoyaltyEvent {
    /// 积分余额变更（正 delta 为入账，负 delta 为扣减）
    #[serde(rename_all = "camelCase")]
    PointsBalanceChanged {
        account_id: String,
        delta: i64,
        new_balance: u64,
        reason: String,
    },
    /// 全局等级变更
    #[serde(rename_all = "camelCase")]
    TierChanged {
        account_id: String,
        old_tier: String,
        new_tier: String,
    },
    /// 徽章授予（含一次性奖励积分）
    #[serde(rename_all = "camelCase")]
    BadgeAwarded {
        account_id: String,
        badge: String,
        bonus: u64,
    },
    /// 推荐奖励发放完成（两侧账户各自独立入账后发出）
    #[serde(rename_all = "camelCase")]
    ReferralRewarded {
        referrer_id: String,
        referee_id: String,
        referrer_points: u64,
        referee_points: u64,
    },
    /// 兑换成功，生成兑换码
    #[serde(rename_all = "camelCase")]
    ExchangeCompleted {
        account_id: String,
        exchange_id: String,
        item_id: String,
        points_used: u64,
        redemption_code: String,
    },
    /// 兑换取消，积分已退回
    #[serde(rename_all = "camelCase")]
    ExchangeCancelled {
        account_id: String,
        exchange_id: String,
        refunded_points: u64,
    },
}

impl LoyaltyEvent {
    /// 事件涉及的账户 ID（推荐事件返回推荐人）
    pub fn account_id(&self) -> &str {
        match self {
            Self::PointsBalanceChanged { account_id, .. }
            | Self::TierChanged { account_id, .. }
            | Self::BadgeAwarded { account_id, .. }
            | Self::ExchangeCompleted { account_id, .. }
            | Self::ExchangeCancelled { account_id, .. } => account_id,
            Self::ReferralRewarded { referrer_id, .. } => referrer_id,
        }
    }
}

/// 事件信封
///
/// 为每个产出事件附加唯一标识与发生时间。`event_id` 使用 UUID v7，
/// 时间有序便于订阅方按序消费与幂等去重。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LoyaltyEvent,
}

impl EventEnvelope {
    pub fn new(event: LoyaltyEvent) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            occurred_at: Utc::now(),
            event,
        }
    }
}

// ---------------------------------------------------------------------------
// EventSink — 事件出口抽象
// ---------------------------------------------------------------------------

/// 事件出口
///
/// 引擎在聚合状态提交后调用 `publish`。实现方负责实际投递；
/// 投递失败只记录，不得反向影响业务状态。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, envelope: EventEnvelope);
}

/// 日志事件出口
///
/// 将事件以结构化日志形式输出，适用于开发环境与没有接入通知系统的部署。
#[derive(Debug, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, envelope: EventEnvelope) {
        tracing::info!(
            event_id = %envelope.event_id,
            account_id = %envelope.event.account_id(),
            payload = %serde_json::to_string(&envelope.event).unwrap_or_default(),
            "领域事件已发布"
        );
    }
}

/// 记录型事件出口
///
/// 在内存中累积所有发布的事件，供测试断言事件流。
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有已发布事件的快照
    pub fn events(&self) -> Vec<LoyaltyEvent> {
        self.events.lock().iter().map(|e| e.event.clone()).collect()
    }

    /// 取出并清空已记录事件
    pub fn take(&self) -> Vec<EventEnvelope> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, envelope: EventEnvelope) {
        self.events.lock().push(envelope);
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------

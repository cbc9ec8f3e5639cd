//! 商户侧实体定义
//!
//! 商户子等级（挂在账户聚合下）与商户积分计划配置。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::MerchantTier;
use crate::normalize::normalize_category;

/// 商户忠诚度记录
///
/// 账户在单一商户处的购买统计。首单时创建，之后每单更新，永不删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantLoyalty {
    pub purchase_count: u32,
    pub sub_tier: MerchantTier,
    pub last_order_date: DateTime<Utc>,
}

impl MerchantLoyalty {
    /// 首单记录：计数 1，等级 Bronze
    pub fn first_order(now: DateTime<Utc>) -> Self {
        Self {
            purchase_count: 1,
            sub_tier: MerchantTier::Bronze,
            last_order_date: now,
        }
    }

    /// 记录一次新购买并重算子等级
    pub fn record_order(&mut self, now: DateTime<Utc>) {
        self.purchase_count += 1;
        self.last_order_date = now;
        self.sub_tier = MerchantTier::for_purchase_count(self.purchase_count);
    }
}

/// 商户积分计划配置
///
/// 分类倍率表的键在写入时即归一化，查找侧用同一函数归一化后匹配，
/// 两侧永远落在相同的键空间。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantConfig {
    pub merchant_id: String,
    /// 积分计划开关；关闭后商户发起的手动积分调整被拒绝
    pub program_enabled: bool,
    /// 归一化分类 -> 倍率
    multipliers: HashMap<String, f64>,
}

impl MerchantConfig {
    pub fn new(merchant_id: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            program_enabled: true,
            multipliers: HashMap::new(),
        }
    }

    /// 整体替换倍率表，键做归一化
    pub fn set_multipliers(&mut self, multipliers: HashMap<String, f64>) {
        self.multipliers = multipliers
            .into_iter()
            .map(|(category, value)| (normalize_category(&category), value))
            .collect();
    }

    /// 查找分类倍率，未配置时返回 1.0
    pub fn multiplier_for(&self, category: &str) -> f64 {
        self.multipliers
            .get(&normalize_category(category))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn multipliers(&self) -> &HashMap<String, f64> {
        &self.multipliers
    }
}

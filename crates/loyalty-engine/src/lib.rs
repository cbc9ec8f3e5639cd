//! 积分账本与等级/兑换引擎
//!
//! 客户忠诚度平台的核心：积分累积（分类倍率、限时特惠倍率）、
//! 多条件等级推导、商户子等级、推荐奖励链、徽章成就防重复发放，
//! 以及兑换码的完整生命周期（发放、校验、核销、过期、取消退款）。
//!
//! 所有对账户和兑换目录的修改都经过带版本的聚合存储原子提交，
//! 并发请求下不会出现丢失更新或超量兑换。外部 I/O（HTTP、支付、
//! 通知投递）不在本 crate 范围内，引擎通过事件接缝与之协作。

pub mod accrual;
pub mod badges;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod merchant;
pub mod models;
pub mod normalize;
pub mod offers;
pub mod redemption;
pub mod referral;
pub mod store;
pub mod tier;

pub use engine::LoyaltyEngine;
pub use error::{EngineError, Result};

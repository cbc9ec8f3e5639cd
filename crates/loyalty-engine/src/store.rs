//! 带版本的内存聚合存储
//!
//! 基于 DashMap 的高并发聚合存储。每个聚合（账户、兑换物品、兑换记录）
//! 以带版本号的单元保存，所有修改通过 `update` 的乐观读-改-写提交：
//! 读取快照、在克隆上应用变更、按版本号比较交换。版本竞争在内部做
//! 有界重试，超限后以 `ConcurrencyConflict` 上报，由调用方决定是否重试。
//!
//! 并发正确性依据：比较交换在 DashMap entry 独占守卫下进行，两个并发
//! 写入者最多一个能以同一版本号提交，丢失更新在结构上不可能发生。

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{EngineError, Result};

/// 默认的乐观冲突内部重试次数
const DEFAULT_MAX_UPDATE_RETRIES: u32 = 5;

/// 带版本号的聚合单元
#[derive(Debug, Clone)]
struct VersionedCell<T> {
    version: u64,
    value: T,
}

/// 聚合存储
///
/// `not_found` 为实体专属的未找到错误构造器，使各存储报出
/// `AccountNotFound` / `ItemNotFound` 等具体错误而非泛化错误。
pub struct AggregateStore<T: Clone> {
    name: &'static str,
    not_found: fn(String) -> EngineError,
    cells: DashMap<String, VersionedCell<T>>,
    max_update_retries: u32,
}

impl<T: Clone> AggregateStore<T> {
    /// 创建聚合存储
    pub fn new(name: &'static str, not_found: fn(String) -> EngineError) -> Self {
        Self::with_retries(name, not_found, DEFAULT_MAX_UPDATE_RETRIES)
    }

    /// 创建聚合存储并指定冲突重试次数
    pub fn with_retries(
        name: &'static str,
        not_found: fn(String) -> EngineError,
        max_update_retries: u32,
    ) -> Self {
        Self {
            name,
            not_found,
            cells: DashMap::new(),
            max_update_retries,
        }
    }

    /// 插入新聚合，键已存在时失败
    pub fn insert_new(&self, id: &str, value: T) -> Result<()> {
        match self.cells.entry(id.to_string()) {
            Entry::Vacant(v) => {
                v.insert(VersionedCell { version: 1, value });
                Ok(())
            }
            Entry::Occupied(_) => Err(EngineError::Validation(format!(
                "{} 已存在: {}",
                self.name, id
            ))),
        }
    }

    /// 插入或整体替换聚合（版本号递增）
    pub fn put(&self, id: &str, value: T) {
        match self.cells.entry(id.to_string()) {
            Entry::Vacant(v) => {
                v.insert(VersionedCell { version: 1, value });
            }
            Entry::Occupied(mut o) => {
                let version = o.get().version;
                *o.get_mut() = VersionedCell {
                    version: version + 1,
                    value,
                };
            }
        }
    }

    /// 获取聚合快照
    ///
    /// 返回克隆，不持有锁
    pub fn get(&self, id: &str) -> Option<T> {
        self.cells.get(id).map(|cell| cell.value.clone())
    }

    /// 获取聚合快照，不存在时报实体专属错误
    pub fn get_required(&self, id: &str) -> Result<T> {
        self.get(id).ok_or_else(|| (self.not_found)(id.to_string()))
    }

    /// 检查是否存在指定聚合
    pub fn contains(&self, id: &str) -> bool {
        self.cells.contains_key(id)
    }

    /// 按条件筛选聚合快照
    pub fn list_by<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.cells
            .iter()
            .filter(|entry| predicate(&entry.value().value))
            .map(|entry| entry.value().value.clone())
            .collect()
    }

    /// 聚合总数
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 乐观读-改-写
    ///
    /// 闭包在聚合的克隆上执行，返回 `Err` 时整个更新中止、不产生任何写入。
    /// 提交时在 entry 独占守卫下校验版本号；版本竞争时用最新快照重跑闭包，
    /// 重试超限后报 `ConcurrencyConflict`。
    ///
    /// 闭包可能被执行多次，必须只通过参数修改聚合并经返回值传出结果，
    /// 不得携带外部累积状态。
    pub fn update<R, F>(&self, id: &str, mut f: F) -> Result<R>
    where
        F: FnMut(&mut T) -> Result<R>,
    {
        for _attempt in 0..=self.max_update_retries {
            // 读取快照后立即释放读守卫，避免与提交阶段的写守卫同分片死锁
            let (version, mut value) = {
                let cell = self
                    .cells
                    .get(id)
                    .ok_or_else(|| (self.not_found)(id.to_string()))?;
                (cell.version, cell.value.clone())
            };

            let result = f(&mut value)?;

            match self.cells.entry(id.to_string()) {
                Entry::Occupied(mut o) => {
                    if o.get().version == version {
                        *o.get_mut() = VersionedCell {
                            version: version + 1,
                            value,
                        };
                        return Ok(result);
                    }
                    // 版本已变，带最新快照重试
                }
                // 记录在读写之间被移除，按未找到处理
                Entry::Vacant(_) => return Err((self.not_found)(id.to_string())),
            }
        }

        Err(EngineError::ConcurrencyConflict {
            resource: format!("{}:{}", self.name, id),
        })
    }
}

// ---------------------------------------------------------------------------
// UniqueIndex — 唯一键预留表
// ---------------------------------------------------------------------------

/// 唯一键预留表
///
/// 为全局唯一的业务键（推荐码、兑换码）提供原子「占坑」：
/// `try_reserve` 在键空缺时写入持有者并返回 true，否则返回 false。
/// 生成方以随机候选键循环调用直到预留成功，保证全局唯一。
pub struct UniqueIndex {
    entries: DashMap<String, String>,
}

impl Default for UniqueIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl UniqueIndex {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// 尝试预留键，成功返回 true
    pub fn try_reserve(&self, key: &str, owner: &str) -> bool {
        match self.entries.entry(key.to_string()) {
            Entry::Vacant(v) => {
                v.insert(owner.to_string());
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// 解析键对应的持有者
    pub fn resolve(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|owner| owner.clone())
    }

    /// 释放键
    pub fn release(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// LoyaltyStore — 引擎聚合存储集合
// ---------------------------------------------------------------------------

use crate::models::{Account, MerchantConfig, PointExchange, PromotionalOffer, RedemptionItem};

/// 引擎全部聚合存储
///
/// 各服务共享同一个实例。推荐码与兑换码的全局唯一性由对应的
/// 预留表保证，生成方必须先预留成功再写入聚合。
pub struct LoyaltyStore {
    pub accounts: AggregateStore<Account>,
    pub merchants: AggregateStore<MerchantConfig>,
    pub offers: AggregateStore<PromotionalOffer>,
    pub items: AggregateStore<RedemptionItem>,
    pub exchanges: AggregateStore<PointExchange>,
    /// 推荐码 -> 账户 ID
    pub referral_codes: UniqueIndex,
    /// 兑换码 -> 兑换记录 ID
    pub redemption_codes: UniqueIndex,
}

impl LoyaltyStore {
    pub fn new() -> Self {
        Self::with_retries(DEFAULT_MAX_UPDATE_RETRIES)
    }

    /// 指定各聚合存储的乐观冲突重试次数
    pub fn with_retries(max_update_retries: u32) -> Self {
        Self {
            accounts: AggregateStore::with_retries(
                "account",
                EngineError::AccountNotFound,
                max_update_retries,
            ),
            merchants: AggregateStore::with_retries(
                "merchant_config",
                |id| EngineError::Validation(format!("商户配置不存在: {id}")),
                max_update_retries,
            ),
            offers: AggregateStore::with_retries(
                "offer",
                EngineError::OfferNotFound,
                max_update_retries,
            ),
            items: AggregateStore::with_retries(
                "redemption_item",
                EngineError::ItemNotFound,
                max_update_retries,
            ),
            exchanges: AggregateStore::with_retries(
                "point_exchange",
                EngineError::ExchangeNotFound,
                max_update_retries,
            ),
            referral_codes: UniqueIndex::new(),
            redemption_codes: UniqueIndex::new(),
        }
    }
}

impl Default for LoyaltyStore {
    fn default() -> Self {
        Self::new()
    }
}

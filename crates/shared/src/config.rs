//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::error::Result;

/// 积分引擎配置
///
/// 业务规则中允许运营调整的参数。未出现在此处的阈值（等级规则、徽章条件）
/// 属于产品定义的一部分，硬编码在引擎内。
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// 每单位消费金额折算的基础积分（price × quantity × multiplier × base_rate）
    pub accrual_base_rate: f64,
    /// 兑换码有效期（天）
    pub exchange_validity_days: i64,
    /// 推荐人奖励积分
    pub referrer_bonus: u64,
    /// 被推荐人奖励积分
    pub referee_bonus: u64,
    /// 乐观并发冲突的最大内部重试次数
    pub max_update_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accrual_base_rate: 10.0,
            exchange_validity_days: 30,
            referrer_bonus: 50,
            referee_bonus: 20,
            max_update_retries: 5,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. 环境变量（LOYALTY_ 前缀，如 LOYALTY_ENGINE_REFERRER_BONUS -> engine.referrer_bonus）
    ///
    /// 所有配置段都有默认值，配置文件缺失时引擎仍可直接构造。
    pub fn load(service_name: &str) -> Result<Self> {
        let env = std::env::var("LOYALTY_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            // 加载默认配置文件
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            // 加载环境特定配置
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            // 环境变量覆盖（LOYALTY_ENGINE_REFERRER_BONUS -> engine.referrer_bonus）
            .add_source(
                Environment::with_prefix("LOYALTY")
                    .separator("_")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_config() {
        let config = EngineConfig::default();
        assert_eq!(config.accrual_base_rate, 10.0);
        assert_eq!(config.exchange_validity_days, 30);
        assert_eq!(config.referrer_bonus, 50);
        assert_eq!(config.referee_bonus, 20);
        assert_eq!(config.max_update_retries, 5);
    }

    #[test]
    fn test_default_observability_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, "pretty");
    }

    #[test]
    fn test_app_config_default_is_usable() {
        // 无配置文件场景下 Default 即可构造完整配置
        let config = AppConfig::default();
        assert!(!config.is_production());
        assert_eq!(config.engine.exchange_validity_days, 30);
    }
}

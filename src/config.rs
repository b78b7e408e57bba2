//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_VERSION_FIELD: &str = "config_version";

/// 默认失效频道前缀
pub const DEFAULT_CHANNEL_PREFIX: &str = "cache:invalidate";

const MAX_TTL_SECS: u64 = 86400 * 30;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
}

/// 全局配置
///
/// 定义适用于所有服务的默认配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 默认的缓存过期时间（秒）
    pub default_ttl_secs: u64,
    /// 序列化类型
    pub serialization: SerializationType,
    /// 是否启用指标收集
    pub enable_metrics: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            serialization: SerializationType::Json,
            enable_metrics: true,
        }
    }
}

/// 服务配置
///
/// 定义单个服务的缓存配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// 缓存过期时间（秒），可覆盖全局配置
    pub ttl_secs: Option<u64>,
    /// 序列化类型，可覆盖全局配置
    pub serialization: Option<SerializationType>,
    /// 本地缓存配置
    pub local: LocalConfig,
    /// 消息总线配置
    pub bus: BusConfig,
}

impl ServiceConfig {
    /// 解析服务的默认TTL
    pub fn default_ttl(&self, global: &GlobalConfig) -> Duration {
        Duration::from_secs(self.ttl_secs.unwrap_or(global.default_ttl_secs))
    }

    /// 解析后台清理间隔，None表示禁用
    pub fn sweep_interval(&self, global: &GlobalConfig) -> Option<Duration> {
        let secs = match self.local.sweep_interval_secs {
            Some(secs) => secs,
            None => DEFAULT_SWEEP_INTERVAL_SECS.min(self.default_ttl(global).as_secs()),
        };
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

/// 序列化类型枚举
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SerializationType {
    /// JSON序列化，配置值 `"json"`
    #[default]
    Json,
    /// 压缩的JSON序列化，配置值 `"json_gzip"`（需要 flate2 特性）
    JsonGzip,
}

/// 未显式配置时的清理间隔上限（秒）
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// 本地缓存配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LocalConfig {
    /// 最大缓存条目数
    pub max_capacity: u64,
    /// 过期/旧代条目清理间隔（秒），0表示禁用后台清理；
    /// 未设置时取 60 秒和服务TTL中的较小值
    pub sweep_interval_secs: Option<u64>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10000,
            sweep_interval_secs: None,
        }
    }
}

/// 消息总线后端类型
///
/// `none` 适用于单实例部署，从不发布也从不订阅
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// 仅进程内
    #[default]
    None,
    /// Redis Pub/Sub
    Redis,
}

/// 消息总线配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BusConfig {
    /// 后端类型
    pub backend: BusBackend,
    /// 缓存失效频道配置
    pub channel: Option<InvalidationChannelConfig>,
    /// 单次发布超时时间（毫秒）
    pub publish_timeout_ms: u64,
    /// 发布队列容量，队列满时新消息被丢弃
    pub publish_queue_capacity: usize,
    /// Redis配置
    pub redis: Option<RedisConfig>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::None,
            channel: None,
            publish_timeout_ms: 3000,
            publish_queue_capacity: 1024,
            redis: None,
        }
    }
}

impl BusConfig {
    /// 解析失效频道名称
    ///
    /// # 参数
    ///
    /// * `service_name` - 服务名称
    ///
    /// # 返回值
    ///
    /// 返回解析后的频道名称
    pub fn resolve_channel_name(&self, service_name: &str) -> String {
        match &self.channel {
            Some(InvalidationChannelConfig::Custom(name)) => name.clone(),
            Some(InvalidationChannelConfig::Structured {
                prefix,
                use_service_name,
            }) => {
                let prefix = prefix.as_deref().unwrap_or(DEFAULT_CHANNEL_PREFIX);
                if *use_service_name {
                    format!("{}:{}", prefix, service_name)
                } else {
                    prefix.to_string()
                }
            }
            None => format!("{}:{}", DEFAULT_CHANNEL_PREFIX, service_name),
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// 缓存失效频道配置
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum InvalidationChannelConfig {
    /// 完整自定义频道名称
    Custom(String),
    /// 结构化配置
    Structured {
        /// 频道名称前缀
        prefix: Option<String>,
        /// 是否使用服务名称作为后缀
        use_service_name: bool,
    },
}

/// Redis连接配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisConfig {
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 订阅断开后的重连间隔（毫秒）
    pub reconnect_delay_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            enable_tls: false,
            reconnect_delay_ms: 1000,
        }
    }
}

impl Config {
    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CacheError::ConfigError(e.to_string()))
    }

    /// 从TOML文件加载配置
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    ///
    /// 返回解析后的配置（未验证）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有必需的字段都已设置，并且值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.global.default_ttl_secs == 0 {
            return Err("Global default_ttl_secs cannot be zero".to_string());
        }

        if self.global.default_ttl_secs > MAX_TTL_SECS {
            return Err(
                "Global default_ttl_secs cannot exceed 30 days (2592000 seconds)".to_string(),
            );
        }

        for (name, service) in &self.services {
            if name.is_empty() {
                return Err("Service name cannot be empty".to_string());
            }

            if name.len() > 64 {
                return Err(format!(
                    "Service name '{}' exceeds maximum length of 64 characters",
                    name
                ));
            }

            let service_ttl = service.ttl_secs.unwrap_or(self.global.default_ttl_secs);
            if service_ttl == 0 {
                return Err(format!("Service '{}' TTL cannot be zero", name));
            }

            if service_ttl > MAX_TTL_SECS {
                return Err(format!("Service '{}' TTL cannot exceed 30 days", name));
            }

            let local = &service.local;
            if local.max_capacity == 0 {
                return Err(format!(
                    "Service '{}' local max_capacity cannot be zero",
                    name
                ));
            }

            if local.max_capacity > 10_000_000 {
                return Err(format!(
                    "Service '{}' local max_capacity cannot exceed 10,000,000",
                    name
                ));
            }

            // 显式配置的清理间隔必须小于等于服务 TTL
            if let Some(interval) = local.sweep_interval_secs {
                if interval > service_ttl {
                    return Err(format!(
                        "Service '{}' sweep_interval_secs ({}) must be <= service TTL ({})",
                        name, interval, service_ttl
                    ));
                }
            }

            let bus = &service.bus;
            if !(100..=60000).contains(&bus.publish_timeout_ms) {
                return Err(format!(
                    "Service '{}' publish_timeout_ms must be between 100 and 60000 ms",
                    name
                ));
            }

            if bus.publish_queue_capacity == 0 {
                return Err(format!(
                    "Service '{}' publish_queue_capacity cannot be zero",
                    name
                ));
            }

            if let Some(InvalidationChannelConfig::Custom(channel)) = &bus.channel {
                if channel.trim().is_empty() {
                    return Err(format!("Service '{}' channel cannot be empty", name));
                }
            }

            match (bus.backend, &bus.redis) {
                (BusBackend::Redis, None) => {
                    return Err(format!(
                        "Service '{}' uses the redis bus but has no [bus.redis] section",
                        name
                    ));
                }
                (BusBackend::Redis, Some(redis)) => {
                    if !(100..=30000).contains(&redis.connection_timeout_ms) {
                        return Err(format!(
                            "Service '{}' connection_timeout_ms must be between 100 and 30000 ms",
                            name
                        ));
                    }

                    if !(100..=60000).contains(&redis.command_timeout_ms) {
                        return Err(format!(
                            "Service '{}' command_timeout_ms must be between 100 and 60000 ms",
                            name
                        ));
                    }
                }
                (BusBackend::None, _) => {}
            }
        }

        Ok(())
    }
}

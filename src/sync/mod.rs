//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了跨节点的失效同步机制：失效消息、消息总线及其实现、发布队列。

pub mod bus;
pub mod memory;
pub mod message;
pub mod publisher;
pub mod redis_bus;

pub use bus::{InvalidationHandler, MessageBus, NoopBus};
pub use memory::{MemoryBroker, MemoryBus};
pub use message::{InvalidationMessage, InvalidationOp, NodeId};
pub use publisher::{PublishOptions, PublishQueue};
pub use redis_bus::RedisBus;

use crate::config::{BusBackend, BusConfig};
use crate::error::{CacheError, Result};
use std::sync::Arc;

/// 根据配置创建消息总线
///
/// # 参数
///
/// * `service_name` - 服务名称，用于解析默认频道
/// * `config` - 总线配置
///
/// # 返回值
///
/// 返回消息总线实例；Redis后端在此处建立连接
pub async fn bus_from_config(service_name: &str, config: &BusConfig) -> Result<Arc<dyn MessageBus>> {
    match config.backend {
        BusBackend::None => Ok(Arc::new(NoopBus)),
        BusBackend::Redis => {
            let redis = config.redis.as_ref().ok_or_else(|| {
                CacheError::ConfigError(format!("缺少{}的Redis配置", service_name))
            })?;
            let channel = config.resolve_channel_name(service_name);
            Ok(Arc::new(RedisBus::connect(channel, redis).await?))
        }
    }
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了消息总线的抽象接口以及仅进程内使用的空实现。

use super::message::InvalidationMessage;
use crate::error::Result;
use crate::metrics::GLOBAL_METRICS;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// 失效消息处理器
///
/// 总线对每条收到的消息调用一次，包括本进程自己发出的消息；
/// 来源过滤由处理器负责，不由总线负责
#[async_trait]
pub trait InvalidationHandler: Send + Sync {
    async fn handle(&self, message: InvalidationMessage);
}

/// 消息总线
///
/// 所有节点通过同一个频道发布和订阅失效消息
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// 后端名称，用于日志
    fn name(&self) -> &'static str;

    /// 是否真的在节点间传播消息
    ///
    /// 返回 false 时引擎不会启动发布队列
    fn is_replicating(&self) -> bool {
        true
    }

    /// 发布失效消息
    async fn publish(&self, message: &InvalidationMessage) -> Result<()>;

    /// 注册处理器，在进程生命周期内只调用一次
    async fn subscribe(&self, handler: Arc<dyn InvalidationHandler>) -> Result<()>;

    /// 停止订阅并释放连接
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// 空消息总线
///
/// 单实例部署使用：从不发布，也从不投递
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBus;

#[async_trait]
impl MessageBus for NoopBus {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_replicating(&self) -> bool {
        false
    }

    async fn publish(&self, _message: &InvalidationMessage) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&self, _handler: Arc<dyn InvalidationHandler>) -> Result<()> {
        Ok(())
    }
}

/// 解码一条原始消息并交给处理器
///
/// 格式错误的消息只记录日志并丢弃，不会中断订阅循环
///
/// # 参数
///
/// * `channel` - 频道名称
/// * `payload` - 原始消息
/// * `handler` - 消息处理器
///
/// # 返回值
///
/// 消息被成功解码并投递时返回 true
pub async fn deliver(channel: &str, payload: &str, handler: &dyn InvalidationHandler) -> bool {
    match InvalidationMessage::decode(payload) {
        Ok(message) => {
            debug!(
                "Bus: channel={}, op={}, target={}, origin={}",
                channel, message.op, message.target, message.origin
            );
            handler.handle(message).await;
            true
        }
        Err(e) => {
            warn!("Bus: dropping malformed message on {}: {}", channel, e);
            GLOBAL_METRICS.record_request(channel, "bus", "receive", "malformed");
            false
        }
    }
}

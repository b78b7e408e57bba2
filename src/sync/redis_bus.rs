//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis Pub/Sub的消息总线，用于处理跨实例的缓存失效。

use super::bus::{deliver, InvalidationHandler, MessageBus};
use super::message::InvalidationMessage;
use crate::backend::redis_provider::{DefaultRedisProvider, RedisProvider};
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use futures::stream::StreamExt;
use redis::aio::{ConnectionManager, PubSub};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Redis消息总线
///
/// 发布走连接管理器（自动重连），订阅使用独立的Pub/Sub连接，
/// 连接断开后在后台按固定间隔重连
pub struct RedisBus {
    /// Redis客户端，用于建立订阅连接
    client: redis::Client,
    /// 发布用的连接管理器
    manager: ConnectionManager,
    /// 频道名称
    channel: String,
    command_timeout: Duration,
    reconnect_delay: Duration,
    cancel: CancellationToken,
}

impl RedisBus {
    /// 连接Redis并创建消息总线
    ///
    /// # 参数
    ///
    /// * `channel` - 频道名称，同一部署的所有节点必须一致
    /// * `config` - Redis配置
    ///
    /// # 返回值
    ///
    /// 返回新的消息总线实例或连接错误
    #[instrument(skip(config), level = "info", name = "init_redis_bus")]
    pub async fn connect(channel: String, config: &RedisConfig) -> Result<Self> {
        Self::connect_with_provider(channel, config, Arc::new(DefaultRedisProvider)).await
    }

    /// 使用指定的Redis提供者创建消息总线
    pub async fn connect_with_provider(
        channel: String,
        config: &RedisConfig,
        provider: Arc<dyn RedisProvider>,
    ) -> Result<Self> {
        let (client, manager) = provider.connect(config).await?;
        Ok(Self {
            client,
            manager,
            channel,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            cancel: CancellationToken::new(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// 建立订阅连接并订阅频道
    async fn open_pubsub(client: &redis::Client, channel: &str) -> Result<PubSub> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }

    /// 消费一个订阅连接直到断开或被取消
    ///
    /// # 返回值
    ///
    /// 被取消时返回 false，连接断开时返回 true（需要重连）
    async fn consume(
        mut pubsub: PubSub,
        channel: &str,
        handler: &dyn InvalidationHandler,
        cancel: &CancellationToken,
    ) -> bool {
        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        return true;
                    };
                    let payload: String = match msg.get_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("RedisBus: unreadable payload on {}: {}", channel, e);
                            continue;
                        }
                    };
                    deliver(channel, &payload, handler).await;
                }
            }
        }
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    fn name(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip(self, message), level = "debug", fields(channel = %self.channel, op = %message.op))]
    async fn publish(&self, message: &InvalidationMessage) -> Result<()> {
        let payload = message.encode()?;
        let mut conn = self.manager.clone();
        let receivers: i64 = timeout(
            self.command_timeout,
            redis::cmd("PUBLISH")
                .arg(&self.channel)
                .arg(payload)
                .query_async(&mut conn),
        )
        .await
        .map_err(|_| {
            CacheError::Timeout(format!(
                "PUBLISH to {} timed out after {:?}",
                self.channel, self.command_timeout
            ))
        })??;
        debug!("RedisBus: published to {} ({} receivers)", self.channel, receivers);
        Ok(())
    }

    async fn subscribe(&self, handler: Arc<dyn InvalidationHandler>) -> Result<()> {
        let client = self.client.clone();
        let channel = self.channel.clone();
        let cancel = self.cancel.clone();
        let reconnect_delay = self.reconnect_delay;

        // 首次订阅在返回前完成，之后发布的消息不会丢
        let mut first = match Self::open_pubsub(&client, &channel).await {
            Ok(pubsub) => {
                info!("RedisBus: subscribed to {}", channel);
                Some(pubsub)
            }
            Err(e) => {
                error!("RedisBus: initial subscribe to {} failed: {}", channel, e);
                None
            }
        };

        tokio::spawn(async move {
            loop {
                let pubsub = match first.take() {
                    Some(pubsub) => Some(pubsub),
                    None => match Self::open_pubsub(&client, &channel).await {
                        Ok(pubsub) => {
                            info!("RedisBus: re-subscribed to {}", channel);
                            Some(pubsub)
                        }
                        Err(e) => {
                            warn!("RedisBus: subscribe to {} failed: {}", channel, e);
                            None
                        }
                    },
                };

                if let Some(pubsub) = pubsub {
                    if !Self::consume(pubsub, &channel, handler.as_ref(), &cancel).await {
                        break;
                    }
                    error!("RedisBus: subscription to {} lost, reconnecting", channel);
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(reconnect_delay) => {}
                }
            }
            info!("RedisBus: subscriber on {} stopped", channel);
        });

        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        Ok(())
    }
}

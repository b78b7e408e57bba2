//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了Redis连接提供者接口和默认实现，供Redis消息总线使用。

use crate::{
    config::RedisConfig,
    error::{CacheError, Result},
    utils::redaction::redact_connection_string,
};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use secrecy::ExposeSecret;
use tokio::time::{timeout, Duration};

/// Redis连接提供者
///
/// 返回用于订阅的原始客户端以及用于发布的连接管理器
#[async_trait]
pub trait RedisProvider: Send + Sync {
    async fn connect(&self, config: &RedisConfig) -> Result<(Client, ConnectionManager)>;
}

pub struct DefaultRedisProvider;

impl DefaultRedisProvider {
    /// 根据TLS设置规范化连接字符串
    fn connection_string(config: &RedisConfig) -> String {
        let raw = config.connection_string.expose_secret();
        if config.enable_tls && !raw.starts_with("rediss://") {
            raw.replace("redis://", "rediss://")
        } else {
            raw.to_string()
        }
    }
}

#[async_trait]
impl RedisProvider for DefaultRedisProvider {
    async fn connect(&self, config: &RedisConfig) -> Result<(Client, ConnectionManager)> {
        let connection_string = Self::connection_string(config);
        let client = Client::open(connection_string.as_str())?;

        let manager = timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        .map_err(|_| {
            CacheError::Timeout(format!(
                "Connection timed out after {}ms. Target: {}",
                config.connection_timeout_ms,
                redact_connection_string(&connection_string)
            ))
        })??;

        tracing::info!(
            "Connected to Redis at {}",
            redact_connection_string(&connection_string)
        );
        Ok((client, manager))
    }
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

#![allow(dead_code)]

use replicache::config::RedisConfig;
use replicache::serialization::SerializerEnum;
use replicache::LocalCache;
use secrecy::SecretString;
use std::future::Future;
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 生成唯一的服务名称，避免测试之间共享指标和频道
pub fn generate_unique_service_name(base: &str) -> String {
    replicache::utils::generate_unique_service_name(base)
}

/// 创建使用JSON序列化的本地缓存
pub fn local_cache(service_name: &str, default_ttl: Duration) -> Arc<LocalCache> {
    Arc::new(LocalCache::new(
        service_name.to_string(),
        10_000,
        default_ttl,
        SerializerEnum::default(),
    ))
}

/// 轮询直到条件成立或超时
///
/// # 返回值
///
/// 条件在超时前成立时返回 true
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// 测试使用的Redis地址，可通过 `REDIS_URL` 覆盖
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

pub fn redis_config() -> RedisConfig {
    RedisConfig {
        connection_string: SecretString::new(redis_url().into()),
        connection_timeout_ms: 2000,
        command_timeout_ms: 2000,
        enable_tls: false,
        reconnect_delay_ms: 200,
    }
}

/// 检查Redis是否可用
///
/// 尝试连接并发送PING，任何失败都视为不可用
pub async fn is_redis_available() -> bool {
    let client = match redis::Client::open(redis_url()) {
        Ok(client) => client,
        Err(_) => return false,
    };
    let connect = client.get_multiplexed_async_connection();
    match tokio::time::timeout(Duration::from_secs(2), connect).await {
        Ok(Ok(mut conn)) => redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok(),
        _ => false,
    }
}

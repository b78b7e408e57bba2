//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存客户端的接口和实现。

pub mod local;
pub mod replicated;

pub use local::LocalCache;
pub use replicated::{InvalidationReplayer, Propagation, ReplicatedCache};

use crate::error::Result;
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::{Serializer, SerializerEnum};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// 缓存扩展特征
///
/// 提供类型安全的缓存操作接口
#[async_trait]
pub trait CacheExt: CacheOps {
    /// 获取缓存值（反序列化）
    #[instrument(skip(self), level = "debug")]
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get_bytes(key).await {
            Some(data) => Ok(Some(self.serializer().deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// 设置缓存值（序列化）
    #[instrument(skip(self, value), level = "debug")]
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let bytes = self.serializer().serialize(value)?;
        self.set_bytes(key, bytes, ttl).await;
        Ok(())
    }

    /// 获取缓存值，未命中时调用 `producer` 生成并写入
    ///
    /// 不保证单飞：并发未命中同一个键时每个调用方都会执行 `producer`，最后写入的值生效。
    /// `producer` 执行期间不持有任何内部锁。
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `ttl` - 存活时间，None 使用服务默认值
    /// * `producer` - 未命中时生成值的函数
    ///
    /// # 返回值
    ///
    /// 返回缓存的值或 `producer` 的结果；`producer` 的错误原样返回且不会被缓存
    #[instrument(skip(self, producer), level = "debug", fields(service = %self.service_name()))]
    async fn get_or_create<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send,
        E: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
    {
        let service = self.service_name();
        if let Some(bytes) = self.get_bytes(key).await {
            match self.serializer().deserialize::<T>(&bytes) {
                Ok(value) => {
                    GLOBAL_METRICS.record_request(service, "local", "get_or_create", "hit");
                    return Ok(value);
                }
                // 同一个键被以不同类型读取，当作未命中重新生成
                Err(e) => warn!("cached value for {} is not readable, recomputing: {}", key, e),
            }
        }

        GLOBAL_METRICS.record_request(service, "local", "get_or_create", "miss");
        let start = std::time::Instant::now();
        let value = match producer().await {
            Ok(value) => value,
            Err(e) => {
                GLOBAL_METRICS.record_request(service, "local", "produce", "failure");
                return Err(e);
            }
        };
        GLOBAL_METRICS.record_duration(service, "local", "produce", start.elapsed().as_secs_f64());

        match self.serializer().serialize(&value) {
            Ok(bytes) => self.set_bytes(key, bytes, ttl).await,
            Err(e) => warn!("value for {} is not cacheable, returning uncached: {}", key, e),
        }
        debug!("get_or_create: key={} produced", key);
        Ok(value)
    }
}

impl<T: CacheOps + ?Sized> CacheExt for T {}

/// 缓存操作特征
///
/// 定义本地引擎和复制引擎共有的字节级操作。删除类操作从不失败。
#[async_trait]
pub trait CacheOps: Send + Sync + Any {
    /// 服务名称
    fn service_name(&self) -> &str;

    /// 获取缓存值
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    ///
    /// # 返回值
    ///
    /// 返回可见条目的值，不存在、过期或已被清空时返回None
    async fn get_bytes(&self, key: &str) -> Option<Arc<[u8]>>;

    /// 设置缓存值
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `value` - 缓存值
    /// * `ttl` - 存活时间，None表示使用默认值，`Duration::ZERO` 表示永不过期
    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>);

    /// 删除缓存项，不存在时无操作
    async fn remove(&self, key: &str);

    /// 删除所有以 `prefix` 开头（忽略大小写）的缓存项
    async fn remove_by_prefix(&self, prefix: &str);

    /// 使所有缓存项失效
    async fn clear_all(&self);

    /// 获取序列化器
    fn serializer(&self) -> &SerializerEnum;

    /// 默认存活时间
    fn default_ttl(&self) -> Duration;

    /// 将 trait object 转换为 Any，用于向下转型
    fn as_any(&self) -> &dyn Any;

    /// 将 `Arc<Trait>` 转换为 `Arc<dyn Any>`，支持 Arc 下的向下转型
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// 优雅关闭客户端
    ///
    /// 关闭所有后台任务，释放资源
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了本地缓存引擎：记忆化读取、按前缀删除和按代数清空。

use super::CacheOps;
use crate::backend::store::EntryStore;
use crate::backend::sweeper::Sweeper;
use crate::error::Result;
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::SerializerEnum;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// 本地缓存引擎
///
/// 只作用于本进程，不发布任何消息
pub struct LocalCache {
    /// 服务名称
    service_name: String,
    /// 条目存储
    store: EntryStore,
    /// 默认存活时间
    default_ttl: Duration,
    /// 序列化器
    serializer: SerializerEnum,
    /// 后台任务取消令牌
    cancel: CancellationToken,
}

impl LocalCache {
    /// 创建新的本地缓存引擎
    ///
    /// # 参数
    ///
    /// * `service_name` - 服务名称
    /// * `max_capacity` - 最大条目数
    /// * `default_ttl` - 调用方未指定时使用的存活时间
    /// * `serializer` - 序列化器
    pub fn new(
        service_name: String,
        max_capacity: u64,
        default_ttl: Duration,
        serializer: SerializerEnum,
    ) -> Self {
        Self {
            service_name,
            store: EntryStore::new(max_capacity),
            default_ttl,
            serializer,
            cancel: CancellationToken::new(),
        }
    }

    /// 启动后台清理任务，随 `shutdown` 停止
    pub fn start_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        Sweeper::new(
            self.service_name.clone(),
            self.store.clone(),
            interval,
            self.cancel.child_token(),
        )
        .spawn()
    }

    /// 底层条目存储
    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    /// 当前代数
    pub fn generation(&self) -> u64 {
        self.store.generation()
    }

    fn resolve_ttl(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.default_ttl)
    }
}

#[async_trait]
impl CacheOps for LocalCache {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn get_bytes(&self, key: &str) -> Option<Arc<[u8]>> {
        let value = self.store.get(key).await;
        let result = if value.is_some() { "hit" } else { "miss" };
        GLOBAL_METRICS.record_request(&self.service_name, "local", "get", result);
        value
    }

    #[instrument(skip(self, value), level = "debug", fields(service = %self.service_name))]
    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        self.store.insert(key, value, self.resolve_ttl(ttl)).await;
    }

    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn remove(&self, key: &str) {
        let removed = self.store.remove(key).await;
        debug!("LocalCache remove: key={}, removed={}", key, removed);
        GLOBAL_METRICS.record_request(&self.service_name, "local", "remove", "success");
    }

    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn remove_by_prefix(&self, prefix: &str) {
        let removed = self.store.remove_by_prefix(prefix).await;
        GLOBAL_METRICS.record_count(
            &self.service_name,
            "local",
            "remove_by_prefix",
            "removed",
            removed as u64,
        );
    }

    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn clear_all(&self) {
        let generation = self.store.advance_generation();
        info!(
            "LocalCache {} cleared, generation={}",
            self.service_name, generation
        );
        GLOBAL_METRICS.record_request(&self.service_name, "local", "clear", "success");
    }

    fn serializer(&self) -> &SerializerEnum {
        &self.serializer
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }

    async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        Ok(())
    }
}

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了复制缓存引擎：先修改本地缓存，再通过消息总线广播失效消息；
//! 其他节点收到消息后只在本地重放，不再广播。

use super::{local::LocalCache, CacheOps};
use crate::config::{GlobalConfig, ServiceConfig};
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::SerializerEnum;
use crate::sync::{
    bus::{InvalidationHandler, MessageBus},
    bus_from_config,
    message::{InvalidationMessage, InvalidationOp, NodeId},
    publisher::{PublishOptions, PublishQueue},
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// 修改操作的传播方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// 修改本地后广播给其他节点
    #[default]
    Broadcast,
    /// 只修改本地，重放远端消息时使用
    LocalOnly,
}

/// 失效消息重放器
///
/// 订阅处理器：丢弃本节点发出的消息，其余消息在本地重放且不再广播
pub struct InvalidationReplayer {
    node_id: NodeId,
    local: Arc<LocalCache>,
}

impl InvalidationReplayer {
    pub fn new(node_id: NodeId, local: Arc<LocalCache>) -> Self {
        Self { node_id, local }
    }

    /// 应用一条收到的失效消息
    ///
    /// # 返回值
    ///
    /// 消息来自其他节点并已应用时返回 true，来自本节点时返回 false
    pub async fn apply(&self, message: InvalidationMessage) -> bool {
        let service = self.local.service_name();
        GLOBAL_METRICS.record_request(service, "bus", "receive", "received");

        if message.origin == self.node_id {
            debug!(
                "Replayer: ignoring own {} {} on service {}",
                message.op, message.target, service
            );
            GLOBAL_METRICS.record_request(service, "bus", "receive", "ignored_own");
            return false;
        }

        match message.op {
            InvalidationOp::RemoveKey => self.local.remove(&message.target).await,
            InvalidationOp::RemoveByPrefix => self.local.remove_by_prefix(&message.target).await,
            InvalidationOp::ClearAll => self.local.clear_all().await,
        }
        debug!(
            "Replayer: applied {} {} from {} on service {}",
            message.op, message.target, message.origin, service
        );
        GLOBAL_METRICS.record_request(service, "bus", "receive", "applied");
        true
    }
}

#[async_trait]
impl InvalidationHandler for InvalidationReplayer {
    async fn handle(&self, message: InvalidationMessage) {
        self.apply(message).await;
    }
}

/// 复制缓存引擎
///
/// `get_or_create` 不复制：每个节点在本地未命中时独立生成值，只有失效操作会广播
pub struct ReplicatedCache {
    /// 本节点标识
    node_id: NodeId,
    /// 本地缓存引擎
    local: Arc<LocalCache>,
    /// 消息总线
    bus: Arc<dyn MessageBus>,
    /// 订阅处理器
    replayer: Arc<InvalidationReplayer>,
    /// 发布队列，总线不复制时为None
    publisher: Option<PublishQueue>,
    /// 后台任务取消令牌
    cancel: CancellationToken,
    /// 发布任务句柄
    publisher_handle: Mutex<Option<JoinHandle<()>>>,
    /// 后台清理任务句柄
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReplicatedCache {
    /// 创建新的复制缓存引擎
    ///
    /// 订阅在返回前注册；订阅失败只记录日志，引擎仍可作为本地缓存使用
    ///
    /// # 参数
    ///
    /// * `local` - 本地缓存引擎
    /// * `bus` - 消息总线
    /// * `options` - 发布队列配置
    ///
    /// # 返回值
    ///
    /// 返回新的复制缓存引擎
    #[instrument(skip(local, bus, options), level = "info", name = "init_replicated_cache", fields(service = %local.service_name(), bus = bus.name()))]
    pub async fn new(
        local: Arc<LocalCache>,
        bus: Arc<dyn MessageBus>,
        options: PublishOptions,
    ) -> Self {
        let node_id = NodeId::random();
        let cancel = CancellationToken::new();
        let service_name = local.service_name().to_string();

        let replayer = Arc::new(InvalidationReplayer::new(node_id, local.clone()));
        if let Err(e) = bus.subscribe(replayer.clone()).await {
            warn!(
                "ReplicatedCache {}: subscribe via {} failed, remote invalidations will not be seen: {}",
                service_name,
                bus.name(),
                e
            );
        }

        let (publisher, publisher_handle) = if bus.is_replicating() {
            let (queue, handle) = PublishQueue::start(
                service_name.clone(),
                bus.clone(),
                options,
                cancel.child_token(),
            );
            (Some(queue), Some(handle))
        } else {
            (None, None)
        };

        info!(
            "ReplicatedCache {} started, node={}, bus={}",
            service_name,
            node_id,
            bus.name()
        );

        Self {
            node_id,
            local,
            bus,
            replayer,
            publisher,
            cancel,
            publisher_handle: Mutex::new(publisher_handle),
            sweeper_handle: Mutex::new(None),
        }
    }

    /// 根据服务配置创建引擎
    ///
    /// 选择序列化器和消息总线，并按配置启动后台清理
    pub async fn from_config(
        service_name: &str,
        service: &ServiceConfig,
        global: &GlobalConfig,
    ) -> Result<Self> {
        let bus = bus_from_config(service_name, &service.bus).await?;
        let serializer = SerializerEnum::from_config(
            service
                .serialization
                .as_ref()
                .unwrap_or(&global.serialization),
        );
        let local = Arc::new(LocalCache::new(
            service_name.to_string(),
            service.local.max_capacity,
            service.default_ttl(global),
            serializer,
        ));

        let options = PublishOptions {
            timeout: service.bus.publish_timeout(),
            queue_capacity: service.bus.publish_queue_capacity,
        };
        let engine = Self::new(local, bus, options).await;
        if let Some(interval) = service.sweep_interval(global) {
            engine.start_sweeper(interval)?;
        }
        Ok(engine)
    }

    /// 启动本地缓存的后台清理，`shutdown` 时停止并等待其退出
    ///
    /// 重复调用会替换并停止之前的清理任务
    pub fn start_sweeper(&self, interval: Duration) -> Result<()> {
        let handle = self.local.start_sweeper(interval);
        let previous = self
            .sweeper_handle
            .lock()
            .map_err(|_| CacheError::ShutdownError("sweeper handle poisoned".to_string()))?
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    /// 本节点标识
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// 本地缓存引擎
    pub fn local(&self) -> &Arc<LocalCache> {
        &self.local
    }

    /// 消息总线后端名称
    pub fn bus_name(&self) -> &'static str {
        self.bus.name()
    }

    /// 删除缓存项
    #[instrument(skip(self), level = "debug", fields(service = %self.local.service_name()))]
    pub async fn remove_with(&self, key: &str, propagation: Propagation) {
        self.local.remove(key).await;
        self.broadcast(propagation, || InvalidationMessage::remove_key(self.node_id, key));
    }

    /// 按前缀删除缓存项
    #[instrument(skip(self), level = "debug", fields(service = %self.local.service_name()))]
    pub async fn remove_by_prefix_with(&self, prefix: &str, propagation: Propagation) {
        self.local.remove_by_prefix(prefix).await;
        self.broadcast(propagation, || {
            InvalidationMessage::remove_by_prefix(self.node_id, prefix)
        });
    }

    /// 清空缓存
    #[instrument(skip(self), level = "debug", fields(service = %self.local.service_name()))]
    pub async fn clear_all_with(&self, propagation: Propagation) {
        self.local.clear_all().await;
        self.broadcast(propagation, || InvalidationMessage::clear_all(self.node_id));
    }

    /// 应用一条来自总线的失效消息
    ///
    /// 与订阅处理器走同一条路径
    ///
    /// # 返回值
    ///
    /// 消息被应用时返回 true；本节点自己发出的消息返回 false
    pub async fn apply_remote(&self, message: InvalidationMessage) -> bool {
        self.replayer.apply(message).await
    }

    /// 等待已入队的失效消息全部发布完成
    pub async fn flush(&self) {
        if let Some(publisher) = &self.publisher {
            publisher.wait_idle().await;
        }
    }

    /// 尚未发布完成的失效消息数
    pub fn pending_publishes(&self) -> usize {
        self.publisher.as_ref().map_or(0, PublishQueue::pending)
    }

    fn broadcast(&self, propagation: Propagation, message: impl FnOnce() -> InvalidationMessage) {
        if propagation == Propagation::LocalOnly {
            return;
        }
        if let Some(publisher) = &self.publisher {
            publisher.enqueue(message());
        }
    }
}

#[async_trait]
impl CacheOps for ReplicatedCache {
    fn service_name(&self) -> &str {
        self.local.service_name()
    }

    async fn get_bytes(&self, key: &str) -> Option<Arc<[u8]>> {
        self.local.get_bytes(key).await
    }

    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        self.local.set_bytes(key, value, ttl).await
    }

    async fn remove(&self, key: &str) {
        self.remove_with(key, Propagation::Broadcast).await
    }

    async fn remove_by_prefix(&self, prefix: &str) {
        self.remove_by_prefix_with(prefix, Propagation::Broadcast)
            .await
    }

    async fn clear_all(&self) {
        self.clear_all_with(Propagation::Broadcast).await
    }

    fn serializer(&self) -> &SerializerEnum {
        self.local.serializer()
    }

    fn default_ttl(&self) -> Duration {
        self.local.default_ttl()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }

    /// 停止发布任务（先发布完队列中剩余的消息）、订阅和后台清理，并等待后台任务退出
    #[instrument(skip(self), level = "info", fields(service = %self.local.service_name()))]
    async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();

        let handle = self
            .publisher_handle
            .lock()
            .map_err(|_| CacheError::ShutdownError("publisher handle poisoned".to_string()))?
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("ReplicatedCache: publish worker ended abnormally: {}", e);
            }
        }

        self.bus.shutdown().await?;
        self.local.shutdown().await?;

        let sweeper = self
            .sweeper_handle
            .lock()
            .map_err(|_| CacheError::ShutdownError("sweeper handle poisoned".to_string()))?
            .take();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                warn!("ReplicatedCache: sweeper ended abnormally: {}", e);
            }
        }
        info!("ReplicatedCache {} shut down", self.local.service_name());
        Ok(())
    }
}

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效消息的发布队列：调用方只负责入队，后台任务负责发布。

use super::bus::MessageBus;
use super::message::InvalidationMessage;
use crate::metrics::GLOBAL_METRICS;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 发布队列配置
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// 单次发布的超时时间，超时后放弃该消息
    pub timeout: Duration,
    /// 队列容量，满时丢弃新消息
    pub queue_capacity: usize,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            queue_capacity: 1024,
        }
    }
}

/// 发布队列
///
/// 有界队列加单个后台任务。总线长时间不可用时内存占用不超过队列容量，
/// 失败和超时只记录日志，不重试。
pub struct PublishQueue {
    service_name: String,
    sender: mpsc::Sender<InvalidationMessage>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl PublishQueue {
    /// 创建队列并启动后台发布任务
    ///
    /// # 参数
    ///
    /// * `service_name` - 服务名称
    /// * `bus` - 消息总线
    /// * `options` - 队列配置
    /// * `cancel` - 取消令牌，触发后任务发布完队列中剩余消息后退出
    ///
    /// # 返回值
    ///
    /// 返回发布队列和后台任务句柄
    pub fn start(
        service_name: String,
        bus: Arc<dyn MessageBus>,
        options: PublishOptions,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(options.queue_capacity.max(1));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let worker = PublishWorker {
            service_name: service_name.clone(),
            bus,
            timeout: options.timeout,
            in_flight: in_flight.clone(),
            idle: idle.clone(),
        };
        let handle = tokio::spawn(worker.run(receiver, cancel));

        (
            Self {
                service_name,
                sender,
                in_flight,
                idle,
            },
            handle,
        )
    }

    /// 将消息加入发布队列，不等待发布结果
    ///
    /// # 返回值
    ///
    /// 入队成功返回 true；队列已满或已关闭时丢弃消息并返回 false
    pub fn enqueue(&self, message: InvalidationMessage) -> bool {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        match self.sender.try_send(message) {
            Ok(()) => {
                GLOBAL_METRICS.set_publish_queue_depth(&self.service_name, self.pending());
                true
            }
            Err(TrySendError::Full(message)) => {
                self.finish_one();
                warn!(
                    "PublishQueue: queue full for service {}, dropping {} {}",
                    self.service_name, message.op, message.target
                );
                GLOBAL_METRICS.record_request(&self.service_name, "bus", "publish", "dropped");
                false
            }
            Err(TrySendError::Closed(message)) => {
                self.finish_one();
                warn!(
                    "PublishQueue: queue closed for service {}, dropping {} {}",
                    self.service_name, message.op, message.target
                );
                GLOBAL_METRICS.record_request(&self.service_name, "bus", "publish", "dropped");
                false
            }
        }
    }

    /// 已入队但尚未完成发布的消息数
    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 等待队列中所有消息处理完成（成功、失败或超时）
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

struct PublishWorker {
    service_name: String,
    bus: Arc<dyn MessageBus>,
    timeout: Duration,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl PublishWorker {
    async fn run(self, mut receiver: mpsc::Receiver<InvalidationMessage>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    receiver.close();
                    while let Some(message) = receiver.recv().await {
                        self.publish_one(message).await;
                    }
                    break;
                }
                message = receiver.recv() => match message {
                    Some(message) => self.publish_one(message).await,
                    None => break,
                }
            }
        }
        info!("PublishQueue worker for service {} stopped", self.service_name);
    }

    async fn publish_one(&self, message: InvalidationMessage) {
        let start = std::time::Instant::now();
        match timeout(self.timeout, self.bus.publish(&message)).await {
            Ok(Ok(())) => {
                debug!(
                    "PublishQueue: published {} {} via {}",
                    message.op,
                    message.target,
                    self.bus.name()
                );
                GLOBAL_METRICS.record_request(&self.service_name, "bus", "publish", "success");
            }
            Ok(Err(e)) => {
                warn!(
                    "PublishQueue: publish of {} {} failed, peers may serve stale data: {}",
                    message.op, message.target, e
                );
                GLOBAL_METRICS.record_request(&self.service_name, "bus", "publish", "failure");
            }
            Err(_) => {
                warn!(
                    "PublishQueue: publish of {} {} abandoned after {:?}",
                    message.op, message.target, self.timeout
                );
                GLOBAL_METRICS.record_request(&self.service_name, "bus", "publish", "timeout");
            }
        }
        GLOBAL_METRICS.record_duration(
            &self.service_name,
            "bus",
            "publish",
            start.elapsed().as_secs_f64(),
        );

        let remaining = self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        GLOBAL_METRICS.set_publish_queue_depth(&self.service_name, remaining);
        if remaining == 0 {
            self.idle.notify_waiters();
        }
    }
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内消息总线，用于在一个进程里模拟多个节点。

use super::bus::{deliver, InvalidationHandler, MessageBus};
use super::message::InvalidationMessage;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 1024;

/// 进程内消息代理
///
/// 相当于一个共享的Redis频道；每个节点通过 `connect` 获得自己的总线句柄。
/// 消息以编码后的字符串传递，会回显给包括发送者在内的所有订阅者。
#[derive(Clone)]
pub struct MemoryBroker {
    channel: String,
    sender: broadcast::Sender<String>,
    available: Arc<AtomicBool>,
}

impl MemoryBroker {
    pub fn new(channel: impl Into<String>) -> Self {
        Self::with_capacity(channel, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(channel: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            channel: channel.into(),
            sender,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// 为一个节点创建总线句柄
    pub fn connect(&self) -> MemoryBus {
        MemoryBus {
            broker: self.clone(),
            cancel: CancellationToken::new(),
        }
    }

    /// 直接向频道写入原始消息，绕过编码
    pub fn publish_raw(&self, payload: impl Into<String>) {
        let _ = self.sender.send(payload.into());
    }

    /// 模拟传输层不可用/恢复
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// 进程内总线的节点句柄
pub struct MemoryBus {
    broker: MemoryBroker,
    cancel: CancellationToken,
}

#[async_trait]
impl MessageBus for MemoryBus {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, message: &InvalidationMessage) -> Result<()> {
        if !self.broker.available.load(Ordering::Acquire) {
            return Err(CacheError::BusError(format!(
                "memory channel {} is unavailable",
                self.broker.channel
            )));
        }
        let payload = message.encode()?;
        // 没有订阅者时 send 返回错误，与Redis返回0个接收者等价
        let receivers = self.broker.sender.send(payload).unwrap_or(0);
        debug!(
            "MemoryBus: published to {} ({} receivers)",
            self.broker.channel, receivers
        );
        Ok(())
    }

    async fn subscribe(&self, handler: Arc<dyn InvalidationHandler>) -> Result<()> {
        let mut receiver = self.broker.sender.subscribe();
        let channel = self.broker.channel.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = receiver.recv() => match received {
                        Ok(payload) => {
                            deliver(&channel, &payload, handler.as_ref()).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("MemoryBus: subscriber on {} lagged, {} messages lost", channel, skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            debug!("MemoryBus: subscriber on {} stopped", channel);
        });
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        Ok(())
    }
}

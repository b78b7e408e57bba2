//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了后台清理任务，定期回收过期和旧代条目。

use super::store::EntryStore;
use crate::metrics::GLOBAL_METRICS;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 后台清理器
///
/// 只影响内存占用，不影响正确性
pub struct Sweeper {
    service_name: String,
    store: EntryStore,
    interval: Duration,
    cancel: CancellationToken,
}

impl Sweeper {
    pub fn new(
        service_name: String,
        store: EntryStore,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service_name,
            store,
            interval,
            cancel,
        }
    }

    /// 启动清理任务
    ///
    /// 任务在取消令牌触发后退出
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            // 第一次 tick 立即返回，跳过
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!("Sweeper for service {} stopped", self.service_name);
                        break;
                    }
                    _ = interval.tick() => {
                        let reclaimed = self.store.sweep().await;
                        if reclaimed > 0 {
                            debug!(
                                "Sweeper: service={}, reclaimed={}",
                                self.service_name, reclaimed
                            );
                            GLOBAL_METRICS.record_count(
                                &self.service_name,
                                "local",
                                "sweep",
                                "reclaimed",
                                reclaimed as u64,
                            );
                        }
                    }
                }
            }
        })
    }
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存管理器，负责初始化和管理所有服务的复制缓存引擎。

use crate::client::{replicated::ReplicatedCache, CacheOps};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use dashmap::DashMap;
use lazy_static::lazy_static;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 缓存管理器
///
/// 负责根据配置初始化所有服务的缓存引擎
pub struct CacheManager;

lazy_static! {
    pub static ref MANAGER: Arc<DashMap<String, Arc<ReplicatedCache>>> = Arc::new(DashMap::new());
}

impl CacheManager {
    /// 初始化缓存管理器
    ///
    /// 根据配置为每个服务创建复制缓存引擎；后端为 `none` 的服务只在进程内生效
    ///
    /// # 参数
    ///
    /// * `config` - 缓存系统配置
    ///
    /// # 返回值
    ///
    /// 返回初始化结果，配置无效或Redis无法连接时返回错误
    #[instrument(skip(config), level = "info", fields(service_count = config.services.len()))]
    pub async fn init(config: Config) -> Result<()> {
        config.validate().map_err(CacheError::ConfigError)?;
        GLOBAL_METRICS.set_enabled(config.global.enable_metrics);

        info!(
            "Initializing CacheManager with {} services",
            config.services.len()
        );

        for (name, service_cfg) in &config.services {
            let engine =
                Arc::new(ReplicatedCache::from_config(name, service_cfg, &config.global).await?);

            // 重复初始化同一服务时关闭旧引擎，避免后台任务泄漏
            if let Some(previous) = MANAGER.insert(name.clone(), engine) {
                if let Err(e) = previous.shutdown().await {
                    warn!("关闭旧的服务 {} 时出错: {}", name, e);
                }
            }
        }
        Ok(())
    }

    /// 从TOML文件加载配置并初始化
    pub async fn init_from_file(path: impl AsRef<std::path::Path>) -> Result<()> {
        Self::init(Config::from_file(path)?).await
    }

    /// 重置缓存管理器（仅用于测试）
    ///
    /// 清除所有已注册的引擎，不关闭它们
    #[doc(hidden)]
    pub fn reset() {
        MANAGER.clear();
    }
}

/// 获取指定服务的缓存客户端
///
/// # 参数
///
/// * `service` - 服务名称
///
/// # 返回值
///
/// 返回对应服务的缓存客户端，如果服务不存在则返回错误
pub fn get_client(service: &str) -> Result<Arc<dyn CacheOps>> {
    get_typed_client(service).map(|engine| engine as Arc<dyn CacheOps>)
}

/// 获取指定服务的复制缓存引擎
///
/// 需要显式控制传播方式（`Propagation`）时使用
pub fn get_typed_client(service: &str) -> Result<Arc<ReplicatedCache>> {
    MANAGER
        .get(service)
        .map(|r| r.value().clone())
        .ok_or_else(|| CacheError::ConfigError(format!("未找到服务{}", service)))
}

/// 优雅关闭所有缓存引擎
///
/// 主要用于应用程序关闭时的清理工作
#[instrument(level = "info")]
pub async fn shutdown_all() -> Result<()> {
    info!("开始关闭所有缓存引擎...");

    let engines: Vec<(String, Arc<ReplicatedCache>)> = MANAGER
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect();
    MANAGER.clear();

    let mut errors = Vec::new();
    for (service_name, engine) in engines {
        match engine.shutdown().await {
            Ok(_) => info!("服务 {} 已成功关闭", service_name),
            Err(e) => {
                warn!("关闭服务 {} 时出错: {}", service_name, e);
                errors.push(format!("{}: {}", service_name, e));
            }
        }
    }

    if errors.is_empty() {
        info!("所有缓存引擎已成功关闭");
        Ok(())
    } else {
        Err(CacheError::ShutdownError(format!(
            "部分引擎关闭失败: {}",
            errors.join(", ")
        )))
    }
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内条目存储，基于Moka，带TTL和代数标记。

use super::generation::Generation;
use crate::utils::starts_with_ignore_case;
use moka::future::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// 缓存条目
///
/// 只属于创建它的进程；只有代数为当前代且未过期时才可见。
#[derive(Clone, Debug)]
pub struct Entry {
    /// 序列化后的值
    pub value: Arc<[u8]>,
    /// 写入时的代数
    pub generation: u64,
    /// 绝对过期时间，None 表示永不过期
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// 判断条目在给定代数和时间下是否可见
    pub fn is_live(&self, current_generation: u64, now: Instant) -> bool {
        self.generation == current_generation && self.expires_at.map_or(true, |at| now < at)
    }
}

/// 条目存储
///
/// 失效条目不会立即回收：读取时顺带删除，或由 `sweep` 统一清理
#[derive(Clone)]
pub struct EntryStore {
    cache: Cache<String, Entry>,
    generation: Arc<Generation>,
}

impl EntryStore {
    /// 创建新的条目存储
    ///
    /// # 参数
    ///
    /// * `max_capacity` - 最大条目数
    pub fn new(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity).build(),
            generation: Arc::new(Generation::new()),
        }
    }

    /// 当前代数
    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    /// 获取可见条目的值
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    ///
    /// # 返回值
    ///
    /// 返回可见条目的值；过期或旧代条目返回None并被顺带删除
    #[instrument(skip(self), level = "debug")]
    pub async fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        let entry = self.cache.get(key).await?;
        if entry.is_live(self.generation.current(), Instant::now()) {
            debug!("store get: key={}, found=true", key);
            return Some(entry.value);
        }

        // 并发写入的新条目可能被一起删除，最多导致一次额外的未命中
        self.cache.invalidate(key).await;
        debug!(
            "store get: key={}, stale entry reclaimed (generation={})",
            key, entry.generation
        );
        None
    }

    /// 写入条目
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `value` - 序列化后的值
    /// * `ttl` - 相对写入时刻的存活时间，`Duration::ZERO` 表示永不过期
    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    pub async fn insert(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let generation = self.generation.current();
        // 超出 Instant 表示范围的TTL视为永不过期
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        self.cache
            .insert(
                key.to_string(),
                Entry {
                    value: value.into(),
                    generation,
                    expires_at,
                },
            )
            .await;
        debug!("store insert: key={}, generation={}", key, generation);
    }

    /// 删除条目，不存在时无操作
    #[instrument(skip(self), level = "debug")]
    pub async fn remove(&self, key: &str) -> bool {
        self.cache.remove(key).await.is_some()
    }

    /// 删除所有以 `prefix` 开头（忽略大小写）的条目
    ///
    /// 需要遍历全部键，是存储中唯一的O(n)操作
    ///
    /// # 返回值
    ///
    /// 返回被删除的条目数
    #[instrument(skip(self), level = "debug")]
    pub async fn remove_by_prefix(&self, prefix: &str) -> usize {
        let matching: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(key, _)| starts_with_ignore_case(key, prefix))
            .map(|(key, _)| key)
            .collect();

        let mut removed = 0;
        for key in matching {
            if self.cache.remove(key.as_str()).await.is_some() {
                removed += 1;
            }
        }
        debug!("store remove_by_prefix: prefix={}, removed={}", prefix, removed);
        removed
    }

    /// 使所有现存条目失效
    ///
    /// 只推进代数，不回收内存
    ///
    /// # 返回值
    ///
    /// 返回新的代数
    pub fn advance_generation(&self) -> u64 {
        let generation = self.generation.advance();
        debug!("store advance_generation: generation={}", generation);
        generation
    }

    /// 回收过期和旧代条目
    ///
    /// # 返回值
    ///
    /// 返回回收的条目数
    #[instrument(skip(self), level = "debug")]
    pub async fn sweep(&self) -> usize {
        let current = self.generation.current();
        let now = Instant::now();
        let stale: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(_, entry)| !entry.is_live(current, now))
            .map(|(key, _)| key)
            .collect();

        let mut reclaimed = 0;
        for key in stale {
            // 清理期间可能有新条目写入同一个键，只删仍然失效的
            if let Some(entry) = self.cache.get(key.as_str()).await {
                if !entry.is_live(self.generation.current(), Instant::now()) {
                    self.cache.invalidate(key.as_str()).await;
                    reclaimed += 1;
                }
            }
        }
        self.cache.run_pending_tasks().await;
        reclaimed
    }

    /// 物理驻留的条目数（包含尚未回收的失效条目）
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    /// 当前可见的所有键
    pub fn live_keys(&self) -> Vec<String> {
        let current = self.generation.current();
        let now = Instant::now();
        self.cache
            .iter()
            .filter(|(_, entry)| entry.is_live(current, now))
            .map(|(key, _)| key.to_string())
            .collect()
    }
}

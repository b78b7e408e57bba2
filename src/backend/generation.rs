//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了条目代数计数器，用于O(1)清空整个本地缓存。

use std::sync::atomic::{AtomicU64, Ordering};

/// 缓存代数
///
/// 每个条目写入时打上当时的代数；清空操作只需把代数加一，
/// 旧代数的条目在读取时即视为不存在。
#[derive(Debug, Default)]
pub struct Generation {
    current: AtomicU64,
}

impl Generation {
    /// 从0开始的新代数
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前代数
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// 进入下一代并返回新的代数
    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// 判断给定代数是否为当前代
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.current()
    }
}

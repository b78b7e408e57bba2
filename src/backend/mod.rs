//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内的条目存储：代数计数器、带TTL的存储和后台清理。

pub mod generation;
pub mod redis_provider;
pub mod store;
pub mod sweeper;

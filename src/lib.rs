//! replicache - 多实例部署下的进程内缓存
//!
//! 每个进程持有自己的本地缓存，失效操作（删除、按前缀删除、清空）
//! 通过发布/订阅频道广播给其他实例，缓存值本身从不在节点间传递。

#![doc(html_root_url = "https://docs.rs/replicache/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use tokio;

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod serialization;
pub mod sync;
pub mod utils;

#[cfg(feature = "macros")]
pub use replicache_macros as macros;

// Re-export commonly used items
pub use client::{CacheExt, CacheOps, LocalCache, Propagation, ReplicatedCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use manager::{get_client, get_typed_client, shutdown_all, CacheManager};
pub use sync::{InvalidationMessage, InvalidationOp, MessageBus, NodeId};

/// replicache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

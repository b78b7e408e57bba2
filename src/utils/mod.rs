//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 统一工具模块
//!
//! 提供库、CLI和测试共用的工具函数，包括：
//! - 日志设置工具
//! - 键前缀匹配
//! - 服务名称生成工具

pub mod redaction;

use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// 安装全局 tracing 订阅者
///
/// 优先使用 `RUST_LOG`，未设置时默认 `info`。重复调用是安全的。
pub fn setup_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(filter)
            .try_init()
            .ok();
    });
}

/// 忽略大小写的前缀匹配
///
/// 逐字符比较小写形式，与序数忽略大小写比较一致；非ASCII字符同样适用。
///
/// # 参数
///
/// * `key` - 缓存键
/// * `prefix` - 前缀
///
/// # 返回值
///
/// `key` 以 `prefix` 开头（忽略大小写）时返回 true
pub fn starts_with_ignore_case(key: &str, prefix: &str) -> bool {
    if prefix.is_ascii() {
        return key.len() >= prefix.len()
            && key.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes());
    }

    let mut key_chars = key.chars();
    for p in prefix.chars() {
        match key_chars.next() {
            Some(k) if k == p || k.to_lowercase().eq(p.to_lowercase()) => {}
            _ => return false,
        }
    }
    true
}

/// 生成唯一的服务名称
pub fn generate_unique_service_name(base: &str) -> String {
    format!("{}_{}", base, uuid::Uuid::new_v4().simple())
}

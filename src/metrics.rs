//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的指标收集和监控功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{span, Level};

/// 指标收集器
///
/// 用于收集和存储缓存系统的各种运行时指标
#[derive(Clone, Debug)]
pub struct Metrics {
    /// 是否记录指标，由 `global.enable_metrics` 控制
    enabled: Arc<AtomicBool>,
    /// 请求总数统计
    /// key: "service:layer:op:result"
    pub requests_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 操作耗时（累积时间和计数）
    /// key: "service:layer:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<Mutex<HashMap<String, (f64, u64)>>>,
    /// 发布队列深度
    pub publish_queue_depth: Arc<Mutex<HashMap<String, usize>>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
            requests_total: Arc::default(),
            operation_duration: Arc::default(),
            publish_queue_depth: Arc::default(),
        }
    }
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

// 指标只是计数，锁中毒时继续使用内部数据
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Metrics {
    /// 开启或关闭指标收集，已有数据保留
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `service` - 服务名称
    /// * `layer` - 组件（local/bus）
    /// * `op` - 操作类型（get/remove/publish/receive ...）
    /// * `result` - 操作结果（hit/miss/success/failure ...）
    pub fn record_request(&self, service: &str, layer: &str, op: &str, result: &str) {
        self.record_count(service, layer, op, result, 1);
    }

    /// 按数量累加请求指标
    pub fn record_count(&self, service: &str, layer: &str, op: &str, result: &str, count: u64) {
        if !self.is_enabled() {
            return;
        }
        let span = span!(Level::TRACE, "cache_request", service, layer, op, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}:{}", service, layer, op, result);
        *lock(&self.requests_total).entry(key).or_insert(0) += count;
    }

    /// 记录操作耗时
    pub fn record_duration(&self, service: &str, layer: &str, op: &str, duration_secs: f64) {
        if !self.is_enabled() {
            return;
        }
        let key = format!("{}:{}:{}", service, layer, op);
        let mut map = lock(&self.operation_duration);
        let entry = map.entry(key).or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 设置发布队列深度
    pub fn set_publish_queue_depth(&self, service: &str, depth: usize) {
        if !self.is_enabled() {
            return;
        }
        lock(&self.publish_queue_depth).insert(service.to_string(), depth);
    }

    /// 读取单个计数器
    pub fn get_count(&self, service: &str, layer: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}:{}", service, layer, op, result);
        lock(&self.requests_total).get(&key).copied().unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为字符串返回，用于监控系统采集
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let reqs = lock(&metrics.requests_total);
    let dur = lock(&metrics.operation_duration);
    let queue = lock(&metrics.publish_queue_depth);

    let mut output = String::new();
    for (k, v) in reqs.iter() {
        output.push_str(&format!("cache_requests_total{{labels=\"{}\"}} {}\n", k, v));
    }
    for (k, (total, count)) in dur.iter() {
        let parts: Vec<&str> = k.split(':').collect();
        if parts.len() == 3 {
            output.push_str(&format!(
                "cache_operation_duration_seconds_sum{{service=\"{}\", layer=\"{}\", operation=\"{}\"}} {}\n",
                parts[0], parts[1], parts[2], total
            ));
            output.push_str(&format!(
                "cache_operation_duration_seconds_count{{service=\"{}\", layer=\"{}\", operation=\"{}\"}} {}\n",
                parts[0], parts[1], parts[2], count
            ));
        }
    }
    for (k, v) in queue.iter() {
        output.push_str(&format!(
            "cache_publish_queue_depth{{service=\"{}\"}} {}\n",
            k, v
        ));
    }
    output
}

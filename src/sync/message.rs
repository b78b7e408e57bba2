//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了节点间广播的失效消息及其线上格式。

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 节点标识
///
/// 每个引擎实例创建时随机生成一次，用于识别并丢弃自己发出的消息
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// 生成随机的128位节点标识
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for NodeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// 失效操作类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationOp {
    /// 删除单个键
    RemoveKey,
    /// 按前缀删除
    RemoveByPrefix,
    /// 清空全部
    ClearAll,
}

impl fmt::Display for InvalidationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvalidationOp::RemoveKey => "remove_key",
            InvalidationOp::RemoveByPrefix => "remove_by_prefix",
            InvalidationOp::ClearAll => "clear_all",
        };
        f.write_str(name)
    }
}

/// 失效消息
///
/// 描述一次删除/清空操作，从不携带缓存值。
/// 线上格式：`{"origin":"<uuid>","op":"remove_key","target":"products:1"}`
/// 删除类操作必须携带 `target`，只有清空操作可以省略
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage")]
pub struct InvalidationMessage {
    /// 发出消息的节点
    pub origin: NodeId,
    /// 操作类型
    pub op: InvalidationOp,
    /// 键或前缀，清空操作时为空
    pub target: String,
}

/// 解码时使用的原始结构
#[derive(Deserialize)]
struct WireMessage {
    origin: NodeId,
    op: InvalidationOp,
    target: Option<String>,
}

impl TryFrom<WireMessage> for InvalidationMessage {
    type Error = String;

    fn try_from(wire: WireMessage) -> std::result::Result<Self, Self::Error> {
        let target = match (wire.op, wire.target) {
            (InvalidationOp::ClearAll, _) => String::new(),
            (_, Some(target)) => target,
            (op, None) => return Err(format!("missing target for {}", op)),
        };
        Ok(Self {
            origin: wire.origin,
            op: wire.op,
            target,
        })
    }
}

impl InvalidationMessage {
    pub fn remove_key(origin: NodeId, key: impl Into<String>) -> Self {
        Self {
            origin,
            op: InvalidationOp::RemoveKey,
            target: key.into(),
        }
    }

    pub fn remove_by_prefix(origin: NodeId, prefix: impl Into<String>) -> Self {
        Self {
            origin,
            op: InvalidationOp::RemoveByPrefix,
            target: prefix.into(),
        }
    }

    pub fn clear_all(origin: NodeId) -> Self {
        Self {
            origin,
            op: InvalidationOp::ClearAll,
            target: String::new(),
        }
    }

    /// 编码为线上格式
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// 从线上格式解码
    ///
    /// 未知操作类型、缺失字段或非法JSON都视为格式错误
    pub fn decode(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| CacheError::MalformedMessage(e.to_string()))
    }
}

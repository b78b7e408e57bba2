//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了JSON序列化器的实现。

use super::Serializer;
use crate::error::{CacheError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// JSON序列化器
///
/// 基于serde_json；启用 `flate2` 特性时可对结果做gzip压缩
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer {
    compress: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self { compress: false }
    }

    /// 创建启用压缩的JSON序列化器
    pub fn with_compression() -> Self {
        Self { compress: true }
    }

    pub fn is_compressed(&self) -> bool {
        self.compress && cfg!(feature = "flate2")
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        if self.is_compressed() {
            gzip::encode(&bytes)
        } else {
            Ok(bytes)
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        let parsed = if self.is_compressed() {
            let raw = gzip::decode(data)?;
            serde_json::from_slice(&raw)
        } else {
            serde_json::from_slice(data)
        };
        parsed.map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

#[cfg(feature = "flate2")]
mod gzip {
    use crate::error::{CacheError, Result};
    use flate2::read::GzDecoder;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Read, Write};

    pub(super) fn encode(data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder
            .write_all(data)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    pub(super) fn decode(data: &[u8]) -> Result<Vec<u8>> {
        let mut decoded = Vec::new();
        GzDecoder::new(data)
            .read_to_end(&mut decoded)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        Ok(decoded)
    }
}

#[cfg(not(feature = "flate2"))]
mod gzip {
    use crate::error::Result;

    pub(super) fn encode(data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    pub(super) fn decode(data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

//! 压缩资源（Asset）：一个源文件压缩后的字节及其来源信息。
//!
//! Asset 一旦由 [`AssetBuilder::finish`] 产生就不可再修改；过期的 Asset 在缓存中被整体替换。

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};

use crate::param::HttpEncoding;

#[derive(Debug, Clone)]
pub struct Asset {
    source_path: PathBuf,
    encoding: HttpEncoding,
    content: Bytes,
    source_mtime: SystemTime,
    created_at: SystemTime,
    freshness_window: Duration,
}

impl Asset {
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn encoding(&self) -> HttpEncoding {
        self.encoding
    }

    /// 共享同一块内存的只读视图
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }

    pub fn content_length(&self) -> usize {
        self.content.len()
    }

    pub fn source_mtime(&self) -> SystemTime {
        self.source_mtime
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn freshness_window(&self) -> Duration {
        self.freshness_window
    }

    /// `now > created_at + freshness_window`
    pub fn is_expired(&self, now: SystemTime) -> bool {
        match self.created_at.checked_add(self.freshness_window) {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    /// `"<contentLength>-<mtimeEpochMillis>"`
    pub fn etag(&self) -> String {
        let mtime = self
            .source_mtime
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("\"{}-{}\"", self.content_length(), mtime)
    }
}

/// 在压缩流水线中逐块累积压缩输出，完成后产出不可变的 [`Asset`]。
#[derive(Debug)]
pub struct AssetBuilder {
    source_path: PathBuf,
    encoding: HttpEncoding,
    buffer: BytesMut,
    source_mtime: SystemTime,
    freshness_window: Duration,
}

impl AssetBuilder {
    pub fn new(
        source_path: &Path,
        encoding: HttpEncoding,
        source_mtime: SystemTime,
        freshness_window: Duration,
    ) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            encoding,
            buffer: BytesMut::new(),
            source_mtime,
            freshness_window,
        }
    }

    pub fn encoding(&self) -> HttpEncoding {
        self.encoding
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn finish(self) -> Asset {
        self.finish_at(SystemTime::now())
    }

    pub fn finish_at(self, created_at: SystemTime) -> Asset {
        Asset {
            source_path: self.source_path,
            encoding: self.encoding,
            content: self.buffer.freeze(),
            source_mtime: self.source_mtime,
            created_at,
            freshness_window: self.freshness_window,
        }
    }
}

//! 源文件访问接口。默认实现直接使用 tokio 的异步文件系统操作，
//! 测试中可以替换为统计调用次数或注入读错误的实现。

use std::io;
use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncRead;

/// 一次 stat 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime: SystemTime,
    pub is_dir: bool,
}

#[async_trait]
pub trait FileSource: Send + Sync {
    type Reader: AsyncRead + Unpin + Send;

    async fn stat(&self, path: &Path) -> io::Result<FileStat>;

    async fn open(&self, path: &Path) -> io::Result<Self::Reader>;
}

/// 本地文件系统
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl FileSource for LocalFs {
    type Reader = File;

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = fs::metadata(path).await?;
        Ok(FileStat {
            size: metadata.len(),
            mtime: metadata.modified()?,
            is_dir: metadata.is_dir(),
        })
    }

    async fn open(&self, path: &Path) -> io::Result<File> {
        File::open(path).await
    }
}

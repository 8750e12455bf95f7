//! # 未压缩静态文件发送器
//!
//! 压缩层在不压缩的情况下（无可接受编码、类型不可压缩、stat 失败、目录）把请求交给
//! [`StaticSender`]。发送器负责自己的 404、目录重定向与首页查找语义。
//! [`FsSender`] 是随服务器一起提供的最小实现。

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    mime,
    param::{HttpRequestMethod, DEFAULT_INDEX},
    request::Request,
    response::{http_date, Response},
    util::{resolve_url_path, url_pathname},
};

/// 交给发送器的参数
#[derive(Debug, Clone, PartialEq)]
pub struct SendOptions {
    /// 已解析并通过安全检查的文件路径；`None` 时发送器自行解析 `url`
    pub path: Option<PathBuf>,
    /// 原始请求 URL（含前缀），用于目录重定向
    pub url: String,
    /// 客户端缓存时间，写入 `Cache-Control: public, max-age=...`
    pub max_age: Duration,
}

impl SendOptions {
    pub fn with_path(path: &Path, url: &str, max_age: Duration) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            url: url.to_string(),
            max_age,
        }
    }

    pub fn with_url(url: &str, max_age: Duration) -> Self {
        Self {
            path: None,
            url: url.to_string(),
            max_age,
        }
    }
}

#[async_trait]
pub trait StaticSender: Send + Sync {
    async fn send<W>(
        &self,
        request: &Request,
        writer: &mut W,
        options: SendOptions,
        id: u128,
    ) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send + ?Sized;
}

/// 直接从本地文件系统发送未压缩文件。
#[derive(Debug, Clone)]
pub struct FsSender {
    root: PathBuf,
    prefix: String,
}

impl FsSender {
    /// `root` 应当是已经规范化的绝对路径（例如 `GzipOptions::root()`）。
    pub fn new(root: &Path, prefix: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            prefix: prefix.to_string(),
        }
    }

    async fn send_file<W>(
        &self,
        request: &Request,
        writer: &mut W,
        options: SendOptions,
        id: u128,
    ) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let pathname = url_pathname(&options.url).to_string();
        let path = match options.path {
            Some(path) => path,
            None => {
                let relative = pathname.strip_prefix(&self.prefix).unwrap_or(&pathname);
                match resolve_url_path(&self.root, relative) {
                    Some(resolved) if resolved.trailing_slash => resolved.path.join(DEFAULT_INDEX),
                    Some(resolved) => resolved.path,
                    None => {
                        warn!("[ID{}]请求的路径：{} 越出根目录，返回403", id, &options.url);
                        let mut response = Response::forbidden();
                        if request.method() == HttpRequestMethod::Head {
                            response.drop_body();
                        }
                        return response.write_to(writer).await;
                    }
                }
            }
        };

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("[ID{}]无法获取{}的元数据：{}，返回404", id, path.display(), e);
                return not_found(request, writer).await;
            }
        };

        if metadata.is_dir() {
            if pathname.ends_with('/') {
                return not_found(request, writer).await;
            }
            debug!("[ID{}]{}是目录，重定向到{}/", id, path.display(), pathname);
            let mut response = Response::from_status_code(301, None);
            response.set_header("Location", &format!("{}/", pathname));
            if request.method() == HttpRequestMethod::Head {
                response.drop_body();
            }
            return response.write_to(writer).await;
        }

        let mtime = metadata.modified()?;
        let mut response = Response::new(200);
        response
            .set_header("Content-Type", &mime::content_type_header(&path))
            .set_header("Content-Length", &metadata.len().to_string())
            .set_header("Last-Modified", &http_date(mtime));
        set_client_cache_headers(&mut response, options.max_age);

        if request.method() == HttpRequestMethod::Head {
            return response.write_to(writer).await;
        }

        let mut file = File::open(&path).await?;
        writer.write_all(&response.head_bytes()).await?;
        let sent = tokio::io::copy(&mut file, writer).await?;
        writer.flush().await?;
        debug!("[ID{}]未压缩发送{}，共{}字节", id, path.display(), sent);
        Ok(())
    }
}

#[async_trait]
impl StaticSender for FsSender {
    async fn send<W>(
        &self,
        request: &Request,
        writer: &mut W,
        options: SendOptions,
        id: u128,
    ) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.send_file(request, writer, options, id).await
    }
}

/// `Cache-Control`、`Expires` 都由客户端缓存时间决定。
pub fn set_client_cache_headers(response: &mut Response, max_age: Duration) {
    let expires = SystemTime::now() + max_age;
    response
        .set_header("Expires", &http_date(expires))
        .set_header(
            "Cache-Control",
            &format!("public, max-age={}", max_age.as_secs()),
        );
}

async fn not_found<W>(request: &Request, writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let mut response = Response::from_status_code(404, Some("你指定的文件无法找到。"));
    if request.method() == HttpRequestMethod::Head {
        response.drop_body();
    }
    response.write_to(writer).await
}

// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 压缩静态文件中间件
//!
//! 对每个 GET/HEAD 请求：
//! 1. 按前缀过滤并把 URL 安全地解析到根目录之下，越界即返回 403；
//! 2. 协商内容编码，检查文件状态与可压缩类型，不满足条件时交给 [`StaticSender`]；
//! 3. 由协商器判断缓存是否可用，再分派为：返回缓存、304、或进入压缩流水线。
//!
//! 缓存存储是唯一的共享可变状态，且只在 `get`/`set` 调用内部加锁，
//! 任何 `.await` 期间都不持有锁。同一路径的并发重压缩是允许的，最后一次写入生效。

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use log::{debug, error, warn};
use tokio::io::AsyncWrite;

use crate::{
    asset::{Asset, AssetBuilder},
    cache::CacheStore,
    config::GzipOptions,
    exception::Exception,
    mime,
    negotiator::{decide, negotiate_encoding, Decision},
    param::{HttpEncoding, HttpRequestMethod, DEFAULT_INDEX},
    pipeline::{compress_to_asset, stream_compressed, PipelineSettings},
    request::Request,
    response::{http_date, parse_http_date, Response},
    sender::{set_client_cache_headers, SendOptions, StaticSender},
    source::{FileSource, FileStat, LocalFs},
    util::{resolve_url_path, url_pathname},
};

/// 中间件处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// 响应已经写出（由本层或文件发送器）
    Handled,
    /// 不属于本层处理范围，交给链上的下一个处理器
    Next,
}

pub struct StaticGzip<S, F = LocalFs> {
    options: GzipOptions,
    store: Arc<dyn CacheStore>,
    sender: S,
    source: F,
}

impl<S: StaticSender> StaticGzip<S, LocalFs> {
    pub fn new(options: GzipOptions, store: Arc<dyn CacheStore>, sender: S) -> Self {
        Self::with_source(options, store, sender, LocalFs)
    }
}

impl<S: StaticSender, F: FileSource> StaticGzip<S, F> {
    pub fn with_source(options: GzipOptions, store: Arc<dyn CacheStore>, sender: S, source: F) -> Self {
        Self {
            options,
            store,
            sender,
            source,
        }
    }

    pub fn options(&self) -> &GzipOptions {
        &self.options
    }

    pub fn source(&self) -> &F {
        &self.source
    }

    /// 处理一个请求，把响应写入 `writer`。
    ///
    /// 返回 `Err(SourceUnreadable)` 时尚未写出任何字节，调用方应生成 5xx；
    /// 返回 `Err(StreamAborted)` 时连接已不可用，调用方应直接关闭。
    pub async fn handle<W>(&self, request: &Request, writer: &mut W, id: u128) -> Result<Flow, Exception>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let method = request.method();
        if method != HttpRequestMethod::Get && method != HttpRequestMethod::Head {
            return Ok(Flow::Next);
        }
        let head_only = method == HttpRequestMethod::Head;

        let pathname = url_pathname(request.path());
        let relative = match pathname.strip_prefix(self.options.prefix()) {
            Some(relative) => relative,
            None => return Ok(Flow::Next),
        };

        let resolved = match resolve_url_path(self.options.root(), relative) {
            Some(resolved) => resolved,
            None => {
                warn!("[ID{}]请求的路径：{} 越出根目录，返回403", id, request.path());
                let mut response = Response::forbidden();
                if head_only {
                    response.drop_body();
                }
                return write_response(&response, writer, id).await;
            }
        };
        let path = if resolved.trailing_slash {
            resolved.path.join(DEFAULT_INDEX)
        } else {
            resolved.path
        };

        let content_type = mime::content_type_header(&path);

        let encoding = match negotiate_encoding(request.accept_encoding()) {
            Some(encoding) => encoding,
            None => {
                debug!("[ID{}]客户端不接受gzip/deflate，交给文件发送器", id);
                return self.pass(request, writer, Some(&path), id).await;
            }
        };

        let stat = match self.source.stat(&path).await {
            Ok(stat) if !stat.is_dir => stat,
            Ok(_) => {
                debug!("[ID{}]{}是目录，以原始URL交给文件发送器", id, path.display());
                return self.pass(request, writer, None, id).await;
            }
            Err(e) => {
                debug!("[ID{}]无法获取{}的元数据：{}，以原始URL交给文件发送器", id, path.display(), e);
                return self.pass(request, writer, None, id).await;
            }
        };

        if !self.options.is_compressible(&content_type) {
            debug!("[ID{}]{}不属于可压缩类型，交给文件发送器", id, content_type);
            return self.pass(request, writer, Some(&path), id).await;
        }

        let key = cache_key(&path, encoding);
        let cached = self.store.get(&key);
        let if_modified_since = request.if_modified_since().and_then(parse_http_date);
        let decision = decide(cached.as_deref(), &stat, if_modified_since, SystemTime::now());
        debug!("[ID{}]{}的缓存决策：{:?}，编码：{}", id, path.display(), decision, encoding);

        match (decision, cached) {
            (Decision::NotModified, Some(asset)) => {
                let mut response = self.compressed_head(&content_type, encoding, &stat, Some(&*asset));
                response.set_code(304).strip_content_headers();
                write_response(&response, writer, id).await
            }
            (Decision::ServeCached, Some(asset)) => {
                let mut response = self.compressed_head(&content_type, encoding, &stat, Some(&*asset));
                response.set_body(asset.content());
                if head_only {
                    response.drop_body();
                }
                write_response(&response, writer, id).await
            }
            _ => {
                self.recompress(writer, &path, &key, &content_type, encoding, &stat, head_only, id)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn recompress<W>(
        &self,
        writer: &mut W,
        path: &Path,
        key: &str,
        content_type: &str,
        encoding: HttpEncoding,
        stat: &FileStat,
        head_only: bool,
        id: u128,
    ) -> Result<Flow, Exception>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let reader = self.source.open(path).await.map_err(|e| {
            error!("[ID{}]无法打开源文件{}：{}", id, path.display(), e);
            Exception::SourceUnreadable
        })?;
        let builder = AssetBuilder::new(path, encoding, stat.mtime, self.options.max_age());
        let settings = PipelineSettings {
            level: self.options.compression_level(),
            chunk_size: self.options.chunk_size(),
        };

        if head_only {
            let asset = Arc::new(compress_to_asset(reader, builder, settings, id).await?);
            self.store.set(key, Arc::clone(&asset));
            let response = self.compressed_head(content_type, encoding, stat, Some(&*asset));
            return write_response(&response, writer, id).await;
        }

        let mut head = self.compressed_head(content_type, encoding, stat, None);
        head.set_header("Transfer-Encoding", "chunked");
        let asset = stream_compressed(reader, writer, &head, builder, settings, id).await?;
        debug!(
            "[ID{}]{}已压缩并放入缓存，{}字节",
            id,
            path.display(),
            asset.content_length()
        );
        if self.store.set(key, Arc::new(asset)).is_some() {
            debug!("[ID{}]替换了{}的旧缓存", id, key);
        }
        Ok(Flow::Handled)
    }

    /// 压缩响应的公共头部；只有在 Asset 完整存在时才设置 `Content-Length` 与 `ETag`。
    fn compressed_head(
        &self,
        content_type: &str,
        encoding: HttpEncoding,
        stat: &FileStat,
        asset: Option<&Asset>,
    ) -> Response {
        let mut response = Response::new(200);
        response
            .set_header("Content-Type", content_type)
            .set_header("Content-Encoding", encoding.name())
            .set_header("Vary", "Accept-Encoding")
            .set_header("Last-Modified", &http_date(stat.mtime));
        set_client_cache_headers(&mut response, self.options.client_max_age());
        if let Some(asset) = asset {
            response
                .set_header("Content-Length", &asset.content_length().to_string())
                .set_header("ETag", &asset.etag());
        }
        response
    }

    /// 交给文件发送器；`path` 为 `None` 时发送器使用原始 URL。
    async fn pass<W>(
        &self,
        request: &Request,
        writer: &mut W,
        path: Option<&Path>,
        id: u128,
    ) -> Result<Flow, Exception>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let max_age = self.options.client_max_age();
        let options = match path {
            Some(path) => SendOptions::with_path(path, request.path(), max_age),
            None => SendOptions::with_url(request.path(), max_age),
        };
        self.sender
            .send(request, writer, options, id)
            .await
            .map_err(|e| {
                error!("[ID{}]文件发送器失败：{}", id, e);
                Exception::StreamAborted
            })?;
        Ok(Flow::Handled)
    }
}

/// 同一文件的不同编码分别缓存。
pub fn cache_key(path: &Path, encoding: HttpEncoding) -> String {
    format!("{}:{}", path.display(), encoding)
}

async fn write_response<W>(response: &Response, writer: &mut W, id: u128) -> Result<Flow, Exception>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    match response.write_to(writer).await {
        Ok(()) => Ok(Flow::Handled),
        Err(e) => {
            error!("[ID{}]发送响应失败：{}", id, e);
            Err(Exception::StreamAborted)
        }
    }
}

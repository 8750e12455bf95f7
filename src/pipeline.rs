//! # 压缩流水线
//!
//! 缓存未命中或过期时，从源文件读取字节流，经压缩器后同时：
//! (a) 以 chunked 编码写给客户端；(b) 累积进新的 [`Asset`]。
//! 整个文件不会在发送前被读入内存，首字节延迟只取决于第一块的压缩。
//!
//! 错误边界：响应头在第一块源数据成功读出之后才发送。
//! 在此之前的读错误返回 [`Exception::SourceUnreadable`]，由错误链生成 5xx；
//! 之后的任何读写错误返回 [`Exception::StreamAborted`]，调用方只能关闭连接。

use log::{debug, error};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    asset::{Asset, AssetBuilder},
    codec::StreamEncoder,
    exception::Exception,
    response::{finish_chunks, write_chunk, Response},
    util::format_file_size,
};

/// 压缩流水线参数
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub level: u32,
    pub chunk_size: usize,
}

/// 边压缩边发送，结束时返回完整的 Asset。
///
/// `head` 必须已经包含 `Transfer-Encoding: chunked`，且不包含 `Content-Length`。
pub async fn stream_compressed<R, W>(
    mut reader: R,
    writer: &mut W,
    head: &Response,
    mut builder: AssetBuilder,
    settings: PipelineSettings,
    id: u128,
) -> Result<Asset, Exception>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut encoder = StreamEncoder::new(builder.encoding(), settings.level);
    let mut buffer = vec![0u8; settings.chunk_size.max(1)];

    let mut read = match reader.read(&mut buffer).await {
        Ok(n) => n,
        Err(e) => {
            error!("[ID{}]发送响应头之前读取源文件失败：{}", id, e);
            return Err(Exception::SourceUnreadable);
        }
    };

    if let Err(e) = writer.write_all(&head.head_bytes()).await {
        error!("[ID{}]发送响应头失败：{}", id, e);
        return Err(Exception::StreamAborted);
    }

    let mut total_read = 0u64;
    while read > 0 {
        total_read += read as u64;
        let output = encoder.write_chunk(&buffer[..read]).map_err(|e| {
            error!("[ID{}]压缩失败：{}", id, e);
            Exception::StreamAborted
        })?;
        builder.push(&output);
        send_chunk(writer, &output, id).await?;

        read = match reader.read(&mut buffer).await {
            Ok(n) => n,
            Err(e) => {
                error!("[ID{}]响应头已发送，读取源文件失败：{}，断开连接", id, e);
                return Err(Exception::StreamAborted);
            }
        };
    }

    let tail = encoder.finish().map_err(|e| {
        error!("[ID{}]结束压缩流失败：{}", id, e);
        Exception::StreamAborted
    })?;
    builder.push(&tail);
    send_chunk(writer, &tail, id).await?;
    if let Err(e) = finish_chunks(writer).await {
        error!("[ID{}]写出结束块失败：{}", id, e);
        return Err(Exception::StreamAborted);
    }

    log_ratio(total_read, builder.len() as u64, id);
    Ok(builder.finish())
}

/// 只压缩、不发送（HEAD 请求），任何读错误都发生在响应头之前。
pub async fn compress_to_asset<R>(
    mut reader: R,
    mut builder: AssetBuilder,
    settings: PipelineSettings,
    id: u128,
) -> Result<Asset, Exception>
where
    R: AsyncRead + Unpin,
{
    let mut encoder = StreamEncoder::new(builder.encoding(), settings.level);
    let mut buffer = vec![0u8; settings.chunk_size.max(1)];
    let mut total_read = 0u64;
    loop {
        let read = reader.read(&mut buffer).await.map_err(|e| {
            error!("[ID{}]读取源文件失败：{}", id, e);
            Exception::SourceUnreadable
        })?;
        if read == 0 {
            break;
        }
        total_read += read as u64;
        let output = encoder.write_chunk(&buffer[..read]).map_err(|e| {
            error!("[ID{}]压缩失败：{}", id, e);
            Exception::SourceUnreadable
        })?;
        builder.push(&output);
    }
    let tail = encoder.finish().map_err(|e| {
        error!("[ID{}]结束压缩流失败：{}", id, e);
        Exception::SourceUnreadable
    })?;
    builder.push(&tail);
    log_ratio(total_read, builder.len() as u64, id);
    Ok(builder.finish())
}

async fn send_chunk<W>(writer: &mut W, data: &[u8], id: u128) -> Result<(), Exception>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_chunk(writer, data).await.map_err(|e| {
        error!("[ID{}]向客户端写入压缩数据失败：{}，停止读取源文件", id, e);
        Exception::StreamAborted
    })
}

fn log_ratio(original: u64, compressed: u64, id: u128) {
    let ratio = if original > 0 {
        (1.0 - compressed as f64 / original as f64) * 100.0
    } else {
        0.0
    };
    debug!(
        "[ID{}]压缩完成，原始: {} -> 压缩后: {}, 压缩率: {:.1}%",
        id,
        format_file_size(original),
        format_file_size(compressed),
        ratio
    );
}

use std::io::{self, Write};

use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};

use crate::param::HttpEncoding;

/// 流式压缩器。
///
/// 每次写入后取走内部缓冲区中已经产生的压缩字节，使压缩与发送可以流水线进行；
/// 所有块按顺序拼接后与一次性压缩的结果一致。
pub enum StreamEncoder {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(DeflateEncoder<Vec<u8>>),
}

impl StreamEncoder {
    pub fn new(encoding: HttpEncoding, level: u32) -> Self {
        let level = Compression::new(level.min(9));
        match encoding {
            HttpEncoding::Gzip => StreamEncoder::Gzip(GzEncoder::new(Vec::new(), level)),
            HttpEncoding::Deflate => StreamEncoder::Deflate(DeflateEncoder::new(Vec::new(), level)),
        }
    }

    pub fn encoding(&self) -> HttpEncoding {
        match self {
            StreamEncoder::Gzip(_) => HttpEncoding::Gzip,
            StreamEncoder::Deflate(_) => HttpEncoding::Deflate,
        }
    }

    /// 压缩一块原始数据，返回目前可用的压缩输出（可能为空）。
    pub fn write_chunk(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            StreamEncoder::Gzip(encoder) => {
                encoder.write_all(data)?;
                Ok(std::mem::take(encoder.get_mut()))
            }
            StreamEncoder::Deflate(encoder) => {
                encoder.write_all(data)?;
                Ok(std::mem::take(encoder.get_mut()))
            }
        }
    }

    /// 结束压缩流，返回剩余的压缩输出（包括 gzip 尾部）。
    pub fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            StreamEncoder::Gzip(encoder) => encoder.finish(),
            StreamEncoder::Deflate(encoder) => encoder.finish(),
        }
    }
}

/// 一次性压缩整块数据。
pub fn compress(data: &[u8], encoding: HttpEncoding, level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = StreamEncoder::new(encoding, level);
    let mut output = encoder.write_chunk(data)?;
    output.extend(encoder.finish()?);
    Ok(output)
}

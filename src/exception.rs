// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了压缩静态文件层在构造与请求处理生命周期中可能出现的各类异常。
//!
//! ## 设计意图
//! - **错误分类**：涵盖协议解析错误、配置错误以及压缩流水线中的读写错误。
//! - **语义映射**：每个变体都对应特定的处理方式，例如 `SourceUnreadable` 交给错误链
//!   生成 500 响应，而 `StreamAborted` 意味着响应头已发出，只能直接断开连接。
//! - **细节在日志中**：变体本身不携带数据，具体原因在出错处通过 `error!` 记录。

use std::fmt;

/// 处理请求或构造中间件过程中发生的异常类型。
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行或请求头格式不完整。
    MalformedRequest,
    /// 客户端使用了服务器无法识别的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 配置文件无法读取或无法解析。
    ConfigUnreadable,
    /// 没有提供静态资源根目录，或根目录无法规范化为绝对路径。
    MissingRoot,
    /// `content_type_match` 不是合法的正则表达式。
    InvalidContentTypeMatch,
    /// `prefix` 必须以 `/` 开头。
    InvalidPrefix,
    /// `max_age` 或 `client_max_age` 超出可表示的范围。
    InvalidMaxAge,
    /// 在发送响应头之前读取源文件失败，交由错误链处理。
    SourceUnreadable,
    /// 响应头已经发出后读写失败（包括客户端断开），连接只能被关闭。
    StreamAborted,
}

use Exception::*;

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed request line or header"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            ConfigUnreadable => write!(f, "Configuration file can't be read or parsed"),
            MissingRoot => write!(f, "Static root directory is missing"),
            InvalidContentTypeMatch => write!(f, "content_type_match must be a regular expression"),
            InvalidPrefix => write!(f, "prefix must start with '/'"),
            InvalidMaxAge => write!(f, "max_age and client_max_age must not exceed 100 years"),
            SourceUnreadable => write!(f, "Source file can't be read before headers were sent"),
            StreamAborted => write!(f, "Stream aborted after headers were sent"),
        }
    }
}

impl std::error::Error for Exception {}

impl Exception {
    /// 该异常是否发生在响应头发出之后（此时无法再返回任何状态码）。
    pub fn headers_sent(&self) -> bool {
        matches!(self, StreamAborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            InvalidContentTypeMatch.to_string(),
            "content_type_match must be a regular expression"
        );
        assert!(SourceUnreadable.to_string().contains("before headers"));
    }

    #[test]
    fn test_headers_sent() {
        assert!(StreamAborted.headers_sent());
        assert!(!SourceUnreadable.headers_sent());
        assert!(!MissingRoot.headers_sent());
    }
}

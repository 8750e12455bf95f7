use crate::{param::*, util::HtmlBuilder};

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use std::{io, time::SystemTime};

/// HTTP-date 格式（RFC 9110 IMF-fixdate）
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// 过时但接收方必须兼容的两种 HTTP-date 写法：RFC 850 与 asctime
const OBSOLETE_DATE_FORMATS: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];

/// 一个待发送的 HTTP 响应。
///
/// 头部按插入顺序保存，名字比较大小写不敏感。`content` 为 `None` 时只发送头部，
/// 用于 HEAD、304 以及由调用方随后以分块方式写入响应体的情形。
#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    headers: Vec<(String, String)>,
    content: Option<Bytes>,
}

impl Response {
    pub fn new(code: u16) -> Self {
        let mut response = Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            headers: Vec::new(),
            content: None,
        };
        response.set_code(code);
        response.set_header("Server", SERVER_NAME);
        response.set_header("Date", &http_date(SystemTime::now()));
        response
    }

    /// 带 HTML 说明页面的状态码响应。
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let content = HtmlBuilder::from_status_code(code, note).build();
        let mut response = Self::new(code);
        response.set_header("Content-Type", "text/html; charset=UTF-8");
        response.set_body(Bytes::from(content));
        response
    }

    /// 路径越界时返回的 403，正文为纯文本。
    pub fn forbidden() -> Self {
        let mut response = Self::new(403);
        response.set_header("Content-Type", "text/plain");
        response.set_body(Bytes::from_static(b"Forbidden"));
        response
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&reason) => reason.to_string(),
            None => {
                error!("非法的状态码：{}。这条错误说明代码编写出现了错误。", code);
                String::new()
            }
        };
        self
    }

    /// 设置（替换）一个头部。
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.remove_header(name);
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self
    }

    /// 移除所有 `Content-*` 头部（用于 304）。
    pub fn strip_content_headers(&mut self) -> &mut Self {
        self.headers
            .retain(|(key, _)| !key.to_ascii_lowercase().starts_with("content"));
        self
    }

    /// 设置响应体并同步 `Content-Length`。
    pub fn set_body(&mut self, content: Bytes) -> &mut Self {
        self.set_header("Content-Length", &content.len().to_string());
        self.content = Some(content);
        self
    }

    /// 丢弃响应体但保留头部（HEAD 请求）。
    pub fn drop_body(&mut self) -> &mut Self {
        self.content = None;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// 状态行与头部，以空行结尾。
    pub fn head_bytes(&self) -> Vec<u8> {
        let version = match self.version {
            HttpVersion::V1_0 => "HTTP/1.0",
            HttpVersion::V1_1 => "HTTP/1.1",
        };
        let mut head = format!("{} {} {}{}", version, self.status_code, self.information, CRLF);
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str(CRLF);
        }
        head.push_str(CRLF);
        head.into_bytes()
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut bytes = self.head_bytes();
        if let Some(content) = &self.content {
            bytes.extend_from_slice(content);
        }
        bytes
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        writer.write_all(&self.head_bytes()).await?;
        if let Some(content) = &self.content {
            writer.write_all(content).await?;
        }
        writer.flush().await
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }
}

/// 写出一个 chunked 编码的数据块。空数据块会被跳过，因为零长度块表示结束。
pub async fn write_chunk<W>(writer: &mut W, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if data.is_empty() {
        return Ok(());
    }
    writer
        .write_all(format!("{:x}{}", data.len(), CRLF).as_bytes())
        .await?;
    writer.write_all(data).await?;
    writer.write_all(CRLF.as_bytes()).await
}

/// 写出结束块。
pub async fn finish_chunks<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(b"0\r\n\r\n").await?;
    writer.flush().await
}

pub fn http_date(time: SystemTime) -> String {
    let date: DateTime<Utc> = time.into();
    date.format(HTTP_DATE_FORMAT).to_string()
}

/// 解析 HTTP-date（IMF-fixdate、RFC 850、asctime），兼容 RFC 2822 写法；无法解析时返回 `None`。
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let value = value.trim();
    for format in std::iter::once(HTTP_DATE_FORMAT).chain(OBSOLETE_DATE_FORMATS) {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc().into());
        }
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc).into())
}

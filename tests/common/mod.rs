//! 集成测试共用的工具：夹具目录、计数文件源、以及内存中的响应解析。

#![allow(dead_code)]

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use flate2::read::{DeflateDecoder, GzDecoder};
use gzip_static::{
    exception::Exception,
    middleware::{Flow, StaticGzip},
    request::Request,
    sender::StaticSender,
    source::{FileSource, FileStat, LocalFs},
};
use tempfile::TempDir;

/// 临时目录下的 `public/` 是 tests/fixtures 的拷贝，`public/` 之外放一个不应被读到的文件。
pub struct FixtureTree {
    dir: TempDir,
}

pub const SECRET: &str = "const secret = 'do not serve me';\n";

impl FixtureTree {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        copy_dir(&fixtures, &dir.path().join("public"));
        std::fs::create_dir(dir.path().join("public/empty")).unwrap();
        std::fs::write(dir.path().join("secret.js"), SECRET).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("public")
    }

    pub fn fixture(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.root().join(name)).unwrap()
    }
}

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// 统计 stat/open 调用次数的文件源
#[derive(Default)]
pub struct CountingFs {
    stats: AtomicUsize,
    opens: AtomicUsize,
}

impl CountingFs {
    pub fn stats(&self) -> usize {
        self.stats.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSource for CountingFs {
    type Reader = tokio::fs::File;

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        self.stats.fetch_add(1, Ordering::SeqCst);
        LocalFs.stat(path).await
    }

    async fn open(&self, path: &Path) -> io::Result<Self::Reader> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        LocalFs.open(path).await
    }
}

/// stat 正常但打开总是失败的文件源
pub struct UnreadableFs;

#[async_trait]
impl FileSource for UnreadableFs {
    type Reader = tokio::fs::File;

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        LocalFs.stat(path).await
    }

    async fn open(&self, _path: &Path) -> io::Result<Self::Reader> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
    }
}

#[derive(Debug)]
pub struct ParsedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ParsedResponse {
    pub fn parse(raw: &[u8]) -> Self {
        let split = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response has no header terminator");
        let head = std::str::from_utf8(&raw[..split]).unwrap();
        let mut lines = head.split("\r\n");
        let status = lines
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or(0);
        let headers = lines
            .filter_map(|line| line.split_once(": "))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut response = Self {
            status,
            headers,
            body: raw[split + 4..].to_vec(),
        };
        if response.header("Transfer-Encoding") == Some("chunked") {
            response.body = dechunk(&response.body);
        }
        response
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_content_headers(&self) -> bool {
        self.headers
            .iter()
            .any(|(k, _)| k.to_ascii_lowercase().starts_with("content"))
    }

    /// 按 `Content-Encoding` 解压后的正文
    pub fn decoded_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self.header("Content-Encoding") {
            Some("gzip") => {
                GzDecoder::new(self.body.as_slice()).read_to_end(&mut out).unwrap();
            }
            Some("deflate") => {
                DeflateDecoder::new(self.body.as_slice()).read_to_end(&mut out).unwrap();
            }
            _ => out = self.body.clone(),
        }
        out
    }
}

fn dechunk(mut body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let line_end = body.windows(2).position(|w| w == b"\r\n").unwrap();
        let size = usize::from_str_radix(std::str::from_utf8(&body[..line_end]).unwrap(), 16).unwrap();
        body = &body[line_end + 2..];
        if size == 0 {
            return out;
        }
        out.extend_from_slice(&body[..size]);
        body = &body[size + 2..];
    }
}

/// 在内存中运行一次请求，返回处理结果与原始输出
pub async fn run_raw<S, F>(middleware: &StaticGzip<S, F>, request: &Request) -> (Result<Flow, Exception>, Vec<u8>)
where
    S: StaticSender,
    F: FileSource,
{
    let mut out: Vec<u8> = Vec::new();
    let flow = middleware.handle(request, &mut out, 0).await;
    (flow, out)
}

/// 运行一次请求并解析响应，要求中间件已经写出响应
pub async fn run<S, F>(middleware: &StaticGzip<S, F>, request: &Request) -> ParsedResponse
where
    S: StaticSender,
    F: FileSource,
{
    let (flow, out) = run_raw(middleware, request).await;
    assert_eq!(flow, Ok(Flow::Handled));
    ParsedResponse::parse(&out)
}

use num_cpus;
use regex::Regex;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exception::Exception;
use crate::param::{DEFAULT_CONTENT_TYPE_MATCH, DEFAULT_MAX_AGE_MS, MAX_AGE_LIMIT_MS};
use crate::util::normalize_path;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    www_root: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default = "default_max_age")]
    max_age: u64,
    #[serde(default)]
    client_max_age: u64,
    #[serde(default = "default_content_type_match")]
    content_type_match: String,
    #[serde(default)]
    prefix: String,
    #[serde(default = "default_compression_level")]
    compression_level: u32,
    #[serde(default)]
    cache_capacity: usize,
}

fn default_port() -> u16 {
    7878
}

fn default_local() -> bool {
    true
}

fn default_chunk_size() -> usize {
    65536 // 64KB
}

fn default_max_age() -> u64 {
    DEFAULT_MAX_AGE_MS
}

fn default_content_type_match() -> String {
    DEFAULT_CONTENT_TYPE_MATCH.to_string()
}

fn default_compression_level() -> u32 {
    6
}

impl Config {
    pub fn new() -> Self {
        Self {
            www_root: ".".to_string(),
            port: default_port(),
            worker_threads: num_cpus::get(),
            local: default_local(),
            chunk_size: default_chunk_size(),
            max_age: default_max_age(),
            client_max_age: 0,
            content_type_match: default_content_type_match(),
            prefix: String::new(),
            compression_level: default_compression_level(),
            cache_capacity: 0,
        }
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let str_val = fs::read_to_string(filename).map_err(|e| {
            error!("无法读取配置文件{}：{}", filename, e);
            Exception::ConfigUnreadable
        })?;
        Self::from_toml_str(&str_val)
    }

    pub fn from_toml_str(str_val: &str) -> Result<Self, Exception> {
        let mut raw_config: Config = toml::from_str(str_val).map_err(|e| {
            error!("无法从配置文件构建配置对象：{}", e);
            Exception::ConfigUnreadable
        })?;
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if raw_config.chunk_size == 0 {
            warn!("chunk_size被设置为0，将使用默认值{}", default_chunk_size());
            raw_config.chunk_size = default_chunk_size();
        }
        if raw_config.compression_level > 9 {
            warn!(
                "compression_level超出范围(0-9)：{}，将被改为9",
                raw_config.compression_level
            );
            raw_config.compression_level = 9;
        }
        Ok(raw_config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_age(&self) -> u64 {
        self.max_age
    }

    pub fn client_max_age(&self) -> u64 {
        self.client_max_age
    }

    pub fn content_type_match(&self) -> &str {
        &self.content_type_match
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }
}

/// 中间件运行时使用的已校验选项。
///
/// 所有校验都在构造时完成：根目录必须存在，`content_type_match` 必须能编译为正则，
/// 前缀必须为空或以 `/` 开头，两个缓存时间都不能超过 [`MAX_AGE_LIMIT_MS`]。
#[derive(Debug, Clone)]
pub struct GzipOptions {
    root: PathBuf,
    prefix: String,
    max_age: Duration,
    client_max_age: Duration,
    content_type_match: Regex,
    compression_level: u32,
    chunk_size: usize,
}

impl GzipOptions {
    /// 以默认选项构造，仅校验根目录。
    pub fn new(root: impl AsRef<Path>) -> Result<Self, Exception> {
        Ok(Self {
            root: resolve_root(root.as_ref())?,
            prefix: String::new(),
            max_age: Duration::from_millis(DEFAULT_MAX_AGE_MS),
            client_max_age: Duration::ZERO,
            content_type_match: compile_match(DEFAULT_CONTENT_TYPE_MATCH)?,
            compression_level: default_compression_level(),
            chunk_size: default_chunk_size(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Exception> {
        Self::new(config.www_root())?
            .with_prefix(config.prefix())?
            .with_content_type_match(config.content_type_match())?
            .with_max_age(Duration::from_millis(config.max_age()))?
            .with_client_max_age(Duration::from_millis(config.client_max_age()))
            .map(|options| {
                options
                    .with_compression_level(config.compression_level())
                    .with_chunk_size(config.chunk_size())
            })
    }

    pub fn with_prefix(mut self, prefix: &str) -> Result<Self, Exception> {
        if !prefix.is_empty() && !prefix.starts_with('/') {
            error!("非法的URL前缀：{}", prefix);
            return Err(Exception::InvalidPrefix);
        }
        self.prefix = prefix.to_string();
        Ok(self)
    }

    pub fn with_content_type_match(mut self, pattern: &str) -> Result<Self, Exception> {
        self.content_type_match = compile_match(pattern)?;
        Ok(self)
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Result<Self, Exception> {
        self.max_age = check_age("max_age", max_age)?;
        Ok(self)
    }

    pub fn with_client_max_age(mut self, client_max_age: Duration) -> Result<Self, Exception> {
        self.client_max_age = check_age("client_max_age", client_max_age)?;
        Ok(self)
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn client_max_age(&self) -> Duration {
        self.client_max_age
    }

    pub fn is_compressible(&self, content_type: &str) -> bool {
        self.content_type_match.is_match(content_type)
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

fn check_age(name: &str, age: Duration) -> Result<Duration, Exception> {
    if age > Duration::from_millis(MAX_AGE_LIMIT_MS) {
        error!("{}过大：{}ms，上限为{}ms", name, age.as_millis(), MAX_AGE_LIMIT_MS);
        return Err(Exception::InvalidMaxAge);
    }
    Ok(age)
}

fn compile_match(pattern: &str) -> Result<Regex, Exception> {
    Regex::new(pattern).map_err(|e| {
        error!("content_type_match无法编译为正则表达式：{}", e);
        Exception::InvalidContentTypeMatch
    })
}

fn resolve_root(root: &Path) -> Result<PathBuf, Exception> {
    if root.as_os_str().is_empty() {
        error!("没有提供静态资源根目录");
        return Err(Exception::MissingRoot);
    }
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|e| {
            error!("无法获取当前工作目录：{}", e);
            Exception::MissingRoot
        })?;
        cwd.join(root)
    };
    let normalized = normalize_path(&absolute).ok_or(Exception::MissingRoot)?;
    match fs::metadata(&normalized) {
        Ok(meta) if meta.is_dir() => Ok(normalized),
        Ok(_) => {
            error!("静态资源根目录{}不是目录", normalized.display());
            Err(Exception::MissingRoot)
        }
        Err(e) => {
            error!("静态资源根目录{}不可用：{}", normalized.display(), e);
            Err(Exception::MissingRoot)
        }
    }
}

use std::path::{Component, Path, PathBuf};

use log::error;
use percent_encoding::percent_decode_str;

use crate::param::STATUS_CODES;

pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = match note {
            Some(n) => n,
            None => match STATUS_CODES.get(&code) {
                Some(d) => *d,
                None => {
                    error!("没有为状态码{}登记原因短语", code);
                    ""
                }
            },
        };
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code, description
        );
        Self { title, css, body }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

/// 纯词法地规范化路径：去掉 `.`，用 `..` 弹出上一级。
///
/// 不访问文件系统，因此不会解析符号链接。`..` 越过文件系统根时返回 `None`。
pub fn normalize_path(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                _ => return None,
            },
            Component::Normal(part) => normalized.push(part),
        }
    }
    Some(normalized)
}

/// URL 路径解析到文件系统后的结果。
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    /// 已规范化的绝对路径，保证位于根目录之下
    pub path: PathBuf,
    /// 解码后的 URL 路径是否以 `/` 结尾（目录请求）
    pub trailing_slash: bool,
}

/// 将（已去掉前缀与查询串的）URL 路径解码并拼接到根目录下。
///
/// 百分号编码先被解码，因此 `%2e%2e` 与字面 `..` 同样处理。
/// 规范化后的路径不在 `root` 之下，或包含 NUL 字节时返回 `None`。
pub fn resolve_url_path(root: &Path, url_path: &str) -> Option<ResolvedPath> {
    let decoded = percent_decode_str(url_path).decode_utf8_lossy();
    if decoded.contains('\0') {
        return None;
    }
    let trailing_slash = decoded.ends_with('/');
    let joined = root.join(decoded.trim_start_matches('/'));
    let path = normalize_path(&joined)?;
    if !path.starts_with(root) {
        return None;
    }
    Some(ResolvedPath {
        path,
        trailing_slash,
    })
}

/// 去掉 URL 中的查询串与片段，只保留路径部分。
pub fn url_pathname(url: &str) -> &str {
    match url.find(|c| c == '?' || c == '#') {
        Some(index) => &url[..index],
        None => url,
    }
}

use std::path::Path;

use log::debug;

use crate::param::{DEFAULT_CHARSET, DEFAULT_MIME, MIME_TYPES};

/// 根据文件扩展名查询 MIME 类型，无法识别时返回 `application/octet-stream`。
pub fn lookup(path: &Path) -> &'static str {
    let extension = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_ascii_lowercase(),
        None => return DEFAULT_MIME,
    };
    match MIME_TYPES.get(extension.as_str()) {
        Some(v) => v,
        None => {
            debug!("未知的文件扩展名：{}", extension);
            DEFAULT_MIME
        }
    }
}

/// 文本类、JavaScript 与 JSON 使用 UTF-8，其余类型返回调用方给出的默认值。
pub fn charset_for<'a>(content_type: &str, default: Option<&'a str>) -> Option<&'a str> {
    if content_type.starts_with("text/")
        || content_type.starts_with("application/javascript")
        || content_type.starts_with("application/json")
    {
        Some(DEFAULT_CHARSET)
    } else {
        default
    }
}

/// 生成 `Content-Type` 头的值：`type; charset=X`（已知字符集时）。
pub fn content_type_header(path: &Path) -> String {
    let mime = lookup(path);
    match charset_for(mime, Some(DEFAULT_CHARSET)) {
        Some(charset) => format!("{}; charset={}", mime, charset),
        None => mime.to_string(),
    }
}

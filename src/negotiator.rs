//! 纯决策逻辑：内容编码协商，以及缓存资源是否可用、是否可以返回 304。

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::asset::Asset;
use crate::param::{HttpEncoding, SUPPORTED_ENCODINGS};
use crate::source::FileStat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// 缓存中的 Asset 新鲜，直接返回
    ServeCached,
    /// 没有缓存，或缓存已过期/源文件已变更，需要重新压缩
    Recompress,
    /// 客户端持有的副本仍是最新的
    NotModified,
}

/// 依次判断（先命中者生效）：
/// 1. 没有缓存 → `Recompress`
/// 2. 缓存的源 mtime 早于当前文件 mtime，或缓存已过期 → `Recompress`
/// 3. `If-Modified-Since` 不早于文件 mtime → `NotModified`
/// 4. 否则 → `ServeCached`
///
/// HTTP-date 只有秒级精度，因此第 3 步将文件 mtime 截断到秒再比较。
pub fn decide(
    cached: Option<&Asset>,
    stat: &FileStat,
    if_modified_since: Option<SystemTime>,
    now: SystemTime,
) -> Decision {
    let asset = match cached {
        Some(asset) => asset,
        None => return Decision::Recompress,
    };
    if asset.source_mtime() < stat.mtime || asset.is_expired(now) {
        return Decision::Recompress;
    }
    match if_modified_since {
        Some(since) if since >= truncate_to_secs(stat.mtime) => Decision::NotModified,
        _ => Decision::ServeCached,
    }
}

/// `*` 选择 gzip；否则按偏好顺序选择第一个以子串形式出现在头部中的编码。
pub fn negotiate_encoding(accept_encoding: Option<&str>) -> Option<HttpEncoding> {
    let accept_encoding = accept_encoding?;
    if accept_encoding.trim() == "*" {
        return Some(HttpEncoding::Gzip);
    }
    SUPPORTED_ENCODINGS
        .iter()
        .copied()
        .find(|encoding| accept_encoding.contains(encoding.name()))
}

fn truncate_to_secs(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => UNIX_EPOCH + Duration::from_secs(elapsed.as_secs()),
        Err(_) => time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetBuilder;
    use proptest::prelude::*;
    use std::path::Path;

    const DAY: Duration = Duration::from_secs(86400);

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn stat(mtime: SystemTime) -> FileStat {
        FileStat {
            size: 10,
            mtime,
            is_dir: false,
        }
    }

    fn asset(mtime: SystemTime, created_at: SystemTime) -> Asset {
        let mut builder = AssetBuilder::new(Path::new("/a.js"), HttpEncoding::Gzip, mtime, DAY);
        builder.push(b"compressed");
        builder.finish_at(created_at)
    }

    #[test]
    fn test_no_cache_recompresses() {
        let decision = decide(None, &stat(at(100)), Some(at(200)), at(300));
        assert_eq!(decision, Decision::Recompress);
    }

    #[test]
    fn test_changed_source_recompresses() {
        let cached = asset(at(100), at(150));
        let decision = decide(Some(&cached), &stat(at(120)), None, at(200));
        assert_eq!(decision, Decision::Recompress);
    }

    #[test]
    fn test_expired_asset_recompresses() {
        let cached = asset(at(100), at(150));
        let now = at(150) + DAY + Duration::from_secs(1);
        let decision = decide(Some(&cached), &stat(at(100)), Some(at(500)), now);
        assert_eq!(decision, Decision::Recompress);
    }

    #[test]
    fn test_fresh_asset_served() {
        let cached = asset(at(100), at(150));
        let decision = decide(Some(&cached), &stat(at(100)), None, at(200));
        assert_eq!(decision, Decision::ServeCached);
    }

    #[test]
    fn test_if_modified_since_equal_is_not_modified() {
        let cached = asset(at(100), at(150));
        let decision = decide(Some(&cached), &stat(at(100)), Some(at(100)), at(200));
        assert_eq!(decision, Decision::NotModified);
    }

    #[test]
    fn test_if_modified_since_subsecond_mtime() {
        let mtime = at(100) + Duration::from_millis(750);
        let cached = asset(mtime, at(150));
        let decision = decide(Some(&cached), &stat(mtime), Some(at(100)), at(200));
        assert_eq!(decision, Decision::NotModified);
    }

    #[test]
    fn test_if_modified_since_before_mtime_serves() {
        let cached = asset(at(100), at(150));
        let decision = decide(Some(&cached), &stat(at(100)), Some(at(99)), at(200));
        assert_eq!(decision, Decision::ServeCached);
    }

    #[test]
    fn test_negotiate_encoding() {
        assert_eq!(negotiate_encoding(Some("*")), Some(HttpEncoding::Gzip));
        assert_eq!(negotiate_encoding(Some(" * ")), Some(HttpEncoding::Gzip));
        assert_eq!(negotiate_encoding(Some("gzip")), Some(HttpEncoding::Gzip));
        assert_eq!(negotiate_encoding(Some("deflate, gzip")), Some(HttpEncoding::Gzip));
        assert_eq!(negotiate_encoding(Some("deflate")), Some(HttpEncoding::Deflate));
        assert_eq!(negotiate_encoding(Some("br")), None);
        assert_eq!(negotiate_encoding(Some("")), None);
        assert_eq!(negotiate_encoding(None), None);
    }

    proptest! {
        #[test]
        fn prop_stale_source_never_served(
            cached_mtime in 0u64..1_000_000,
            delta in 1u64..1_000_000,
            since in proptest::option::of(0u64..3_000_000),
        ) {
            let cached = asset(at(cached_mtime), at(cached_mtime));
            let current = stat(at(cached_mtime + delta));
            let decision = decide(Some(&cached), &current, since.map(at), at(cached_mtime));
            prop_assert_eq!(decision, Decision::Recompress);
        }
    }
}

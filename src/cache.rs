use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::warn;
use lru::LruCache;

use crate::asset::Asset;

/// 压缩资源的键值存储。
///
/// `get` 与 `set` 都是同步、进程内且不会失败的操作；实现只需保证单个键上的原子性。
/// 锁只在一次 `get`/`set` 调用内持有，绝不会跨越 `.await`。
#[cfg_attr(test, mockall::automock)]
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<Asset>>;

    /// 放入新的 Asset，返回被替换的旧值
    fn set(&self, key: &str, asset: Arc<Asset>) -> Option<Arc<Asset>>;
}

/// 无容量上限的内存存储，条目只会被更新的 Asset 覆盖。
#[derive(Default)]
pub struct MemoryStore {
    assets: RwLock<HashMap<String, Arc<Asset>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.assets.read().map(|map| map.len()).unwrap_or(0)
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Arc<Asset>> {
        let assets = match self.assets.read() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        };
        assets.get(key).cloned()
    }

    fn set(&self, key: &str, asset: Arc<Asset>) -> Option<Arc<Asset>> {
        let mut assets = match self.assets.write() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        };
        assets.insert(key.to_string(), asset)
    }
}

/// 容量受限的 LRU 存储，适合资源数量不可控的站点。
pub struct LruStore {
    cache: Mutex<LruCache<String, Arc<Asset>>>,
}

impl LruStore {
    pub fn from_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<Asset>>> {
        match self.cache.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

impl CacheStore for LruStore {
    fn get(&self, key: &str) -> Option<Arc<Asset>> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, asset: Arc<Asset>) -> Option<Arc<Asset>> {
        self.lock().put(key.to_string(), asset)
    }
}

/// 根据配置选择存储：容量为 0 时使用无上限的 `MemoryStore`。
pub fn store_from_capacity(capacity: usize) -> Arc<dyn CacheStore> {
    match NonZeroUsize::new(capacity) {
        Some(capacity) => Arc::new(LruStore::from_capacity(capacity)),
        None => Arc::new(MemoryStore::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetBuilder;
    use crate::param::HttpEncoding;
    use std::path::Path;
    use std::time::{Duration, SystemTime};

    fn asset(content: &str, mtime: SystemTime) -> Arc<Asset> {
        let mut builder = AssetBuilder::new(
            Path::new("file1.txt"),
            HttpEncoding::Gzip,
            mtime,
            Duration::from_secs(86400),
        );
        builder.push(content.as_bytes());
        Arc::new(builder.finish())
    }

    #[test]
    fn test_memory_store_get_set() {
        let store = MemoryStore::new();
        let time = SystemTime::now();
        assert!(store.get("file1.txt").is_none());

        assert!(store.set("file1.txt", asset("content", time)).is_none());
        let found = store.get("file1.txt").unwrap();
        assert_eq!(found.content(), "content".as_bytes());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_set_returns_previous() {
        let store = MemoryStore::new();
        let time1 = SystemTime::now();
        let time2 = time1 + Duration::from_secs(10);

        store.set("file1.txt", asset("old content", time1));
        let previous = store.set("file1.txt", asset("new content", time2)).unwrap();

        assert_eq!(previous.content(), "old content".as_bytes());
        assert_eq!(previous.source_mtime(), time1);
        let found = store.get("file1.txt").unwrap();
        assert_eq!(found.content(), "new content".as_bytes());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_is_unbounded() {
        let store = MemoryStore::new();
        let time = SystemTime::now();
        for i in 0..1000 {
            store.set(&format!("file{}.txt", i), asset("x", time));
        }
        assert_eq!(store.len(), 1000);
        assert!(store.get("file0.txt").is_some());
    }

    #[test]
    fn test_lru_store_eviction() {
        let store = LruStore::from_capacity(NonZeroUsize::new(2).unwrap());
        let time = SystemTime::now();

        store.set("file1.txt", asset("content1", time));
        store.set("file2.txt", asset("content2", time));
        assert_eq!(store.len(), 2);

        store.get("file1.txt");
        store.set("file3.txt", asset("content3", time));
        assert_eq!(store.len(), 2);

        assert!(store.get("file2.txt").is_none());
        assert!(store.get("file1.txt").is_some());
        assert!(store.get("file3.txt").is_some());
    }

    #[test]
    fn test_lru_store_set_returns_previous() {
        let store = LruStore::from_capacity(NonZeroUsize::new(3).unwrap());
        let time = SystemTime::now();
        assert!(store.set("a", asset("1", time)).is_none());
        let previous = store.set("a", asset("2", time)).unwrap();
        assert_eq!(previous.content(), "1".as_bytes());
    }

    #[test]
    fn test_store_from_capacity() {
        let time = SystemTime::now();
        let unbounded = store_from_capacity(0);
        let bounded = store_from_capacity(1);
        for store in [unbounded, bounded] {
            store.set("a", asset("1", time));
            assert!(store.get("a").is_some());
        }
    }

    #[test]
    fn test_concurrent_sets_last_write_wins() {
        let store = Arc::new(MemoryStore::new());
        let time = SystemTime::now();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.set("same.js", asset(&format!("v{}", i), time));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 1);
        assert!(store.get("same.js").is_some());
    }
}

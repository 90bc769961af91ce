//! `cache`：有界 LRU，供多次查询共享，避免对同一表面形式重复访问外部查询源。
//!
//! 底层是 `lru::LruCache`，命中/未命中计数与它放在同一把锁里。

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;

/// 缓存统计。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

struct Inner<K, V> {
    entries: LruCache<K, V>,
    hits: u64,
    misses: u64,
}

/// 线程安全的有界 LRU 缓存。
pub struct LookupCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> LookupCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// `capacity` 为 0 时按 1 处理；配置层会提前拒绝 0。
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        // 锁中毒时直接接管
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 只判断是否存在，不刷新最近使用顺序。
    pub fn contains_key(&self, key: &K) -> bool {
        self.lock().entries.contains(key)
    }

    /// 命中时把条目提到最前。
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        match inner.entries.get(key).cloned() {
            Some(v) => {
                inner.hits += 1;
                Some(v)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// 写入；满了就淘汰最久未使用的条目。
    pub fn put(&self, key: K, value: V) {
        self.lock().entries.put(key, value);
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            len: inner.entries.len(),
            capacity: inner.entries.cap().get(),
        }
    }
}

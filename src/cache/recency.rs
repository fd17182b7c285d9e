//! LRU 访问顺序列表
//!
//! 基于 `lru::LruCache<K, ()>`，只维护键的访问顺序；条目本身和字节统计
//! 由持有者放在同一把互斥锁内维护。容量不设上限，淘汰由持有者按字节数 /
//! 条目数决定。

use lru::LruCache;
use std::hash::Hash;

pub(crate) struct RecencyList<K: Hash + Eq> {
    order: LruCache<K, ()>,
}

impl<K: Hash + Eq + Clone> RecencyList<K> {
    pub(crate) fn new() -> Self {
        Self {
            order: LruCache::unbounded(),
        }
    }

    /// 标记为最近使用 (不存在则插入)
    pub(crate) fn touch(&mut self, key: &K) {
        self.order.put(key.clone(), ());
    }

    pub(crate) fn remove(&mut self, key: &K) -> bool {
        self.order.pop(key).is_some()
    }

    /// 弹出最久未使用的键
    pub(crate) fn pop_lru(&mut self) -> Option<K> {
        self.order.pop_lru().map(|(key, _)| key)
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
    }
}

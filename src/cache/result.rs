//! 查询结果缓存
//!
//! 有界结果缓存:
//! - LRU 淘汰 (按访问顺序，不是按插入顺序)
//! - TTL 惰性过期 (读取时检查，可选 purge_expired 主动清理)
//! - 字节数与条目数双上限
//!
//! 条目表、访问顺序、字节统计和计数器放在同一把互斥锁内，
//! 任何时刻都观察不到 "已计入大小但未插入" 的中间状态。

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::recency::RecencyList;
use super::size::EstimateSize;
use super::QueryResult;
use crate::query::canonical::{canonicalize, CacheKey};
use crate::query::types::QueryDescriptor;

// ═══════════════════════════════════════════════════════════════════════════
// 配置
// ═══════════════════════════════════════════════════════════════════════════

/// 缓存配置 (构造时固定)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 最大总字节数
    pub max_size_bytes: usize,
    /// 条目生存时间
    pub ttl: Duration,
    /// 最大条目数
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 50 * 1024 * 1024, // 50 MB
            ttl: Duration::from_secs(1800),
            max_entries: 500,
        }
    }
}

impl CacheConfig {
    pub fn with_max_size(mut self, bytes: usize) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 条目与统计
// ═══════════════════════════════════════════════════════════════════════════

/// 缓存条目，payload 写入后不再修改
struct CacheEntry {
    payload: QueryResult,
    created_at: Instant,
    access_count: u64,
    size_bytes: usize,
    key: CacheKey,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

/// 缓存统计快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub current_size_bytes: usize,
    pub max_size_bytes: usize,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    pub fn current_size_mb(&self) -> f64 {
        self.current_size_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn max_size_mb(&self) -> f64 {
        self.max_size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// 热点条目概要
#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub key: CacheKey,
    pub access_count: u64,
    pub size_bytes: usize,
    pub age: Duration,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    recency: RecencyList<CacheKey>,
    current_size_bytes: usize,
    counters: Counters,
}

enum Lookup {
    Hit(QueryResult),
    Expired,
    Miss,
}

impl CacheState {
    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(key);
        self.current_size_bytes -= entry.size_bytes;
        Some(entry)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 结果缓存
// ═══════════════════════════════════════════════════════════════════════════

/// 查询结果缓存
pub struct ResultCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                recency: RecencyList::new(),
                current_size_bytes: 0,
                counters: Counters::default(),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 查询缓存
    pub fn get(&self, descriptor: &QueryDescriptor) -> Option<QueryResult> {
        self.get_by_key_at(&canonicalize(descriptor), Instant::now())
    }

    /// 以指定时刻查询缓存 (过期判断基于 `now`)
    pub fn get_at(&self, descriptor: &QueryDescriptor, now: Instant) -> Option<QueryResult> {
        self.get_by_key_at(&canonicalize(descriptor), now)
    }

    pub fn get_by_key(&self, key: &CacheKey) -> Option<QueryResult> {
        self.get_by_key_at(key, Instant::now())
    }

    fn get_by_key_at(&self, key: &CacheKey, now: Instant) -> Option<QueryResult> {
        let mut state = self.state.lock();

        let lookup = match state.entries.get_mut(key) {
            Some(entry) if entry.is_expired(now, self.config.ttl) => Lookup::Expired,
            Some(entry) => {
                entry.access_count += 1;
                Lookup::Hit(entry.payload.clone())
            }
            None => Lookup::Miss,
        };

        match lookup {
            Lookup::Hit(payload) => {
                state.recency.touch(key);
                state.counters.hits += 1;
                Some(payload)
            }
            Lookup::Expired => {
                state.remove(key);
                state.counters.misses += 1;
                log::debug!("result cache entry expired: {}", key);
                None
            }
            Lookup::Miss => {
                state.counters.misses += 1;
                log::trace!("result cache miss: {}", key);
                None
            }
        }
    }

    /// 写入缓存 (同键替换而非重复计入)
    pub fn put(&self, descriptor: &QueryDescriptor, payload: QueryResult) {
        self.put_by_key_at(canonicalize(descriptor), payload, Instant::now());
    }

    /// 以指定时刻写入缓存 (条目创建时间为 `now`)
    pub fn put_at(&self, descriptor: &QueryDescriptor, payload: QueryResult, now: Instant) {
        self.put_by_key_at(canonicalize(descriptor), payload, now);
    }

    pub fn put_by_key(&self, key: CacheKey, payload: QueryResult) {
        self.put_by_key_at(key, payload, Instant::now());
    }

    fn put_by_key_at(&self, key: CacheKey, payload: QueryResult, now: Instant) {
        // 大小估算不依赖共享状态，放在锁外
        let size_bytes = payload.estimated_size();

        let mut state = self.state.lock();
        state.remove(&key);

        state.recency.touch(&key);
        state.current_size_bytes += size_bytes;
        state.entries.insert(
            key.clone(),
            CacheEntry {
                payload,
                created_at: now,
                access_count: 1,
                size_bytes,
                key,
            },
        );

        self.evict_if_needed(&mut state);
    }

    /// 淘汰最久未使用的条目直到满足上限；表空时即使仍超限也停止
    fn evict_if_needed(&self, state: &mut CacheState) {
        while state.current_size_bytes > self.config.max_size_bytes
            || state.entries.len() > self.config.max_entries
        {
            let key = match state.recency.pop_lru() {
                Some(key) => key,
                None => break,
            };
            if let Some(entry) = state.entries.remove(&key) {
                state.current_size_bytes -= entry.size_bytes;
                state.counters.evictions += 1;
                log::debug!(
                    "evicted result cache entry {} ({} bytes)",
                    key,
                    entry.size_bytes
                );
            }
        }
    }

    /// 主动清理所有过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let expired: Vec<CacheKey> = state
            .entries
            .values()
            .filter(|e| e.is_expired(now, self.config.ttl))
            .map(|e| e.key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    /// 清空所有条目；命中/未命中/淘汰计数是进程级累计值，不重置
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        state.recency.clear();
        state.current_size_bytes = 0;
        log::info!("result cache cleared ({} entries dropped)", dropped);
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let total = state.counters.hits + state.counters.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            state.counters.hits as f64 / total as f64
        };

        CacheStats {
            hits: state.counters.hits,
            misses: state.counters.misses,
            hit_rate,
            evictions: state.counters.evictions,
            current_size_bytes: state.current_size_bytes,
            max_size_bytes: self.config.max_size_bytes,
            entries: state.entries.len(),
            max_entries: self.config.max_entries,
        }
    }

    /// 访问次数最多的条目
    pub fn top_entries(&self, limit: usize) -> Vec<EntrySummary> {
        let now = Instant::now();
        let state = self.state.lock();
        let mut entries: Vec<&CacheEntry> = state.entries.values().collect();
        entries.sort_by(|a, b| {
            b.access_count
                .cmp(&a.access_count)
                .then_with(|| a.key.cmp(&b.key))
        });

        entries
            .into_iter()
            .take(limit)
            .map(|e| EntrySummary {
                key: e.key.clone(),
                access_count: e.access_count,
                size_bytes: e.size_bytes,
                age: now.saturating_duration_since(e.created_at),
            })
            .collect()
    }

    /// 是否存在 (不计入命中统计，也不检查过期)
    pub fn contains(&self, descriptor: &QueryDescriptor) -> bool {
        self.state.lock().entries.contains_key(&canonicalize(descriptor))
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

//! # ROLLUP-ROUTER
//!
//! 事件日志聚合查询的预聚合路由与结果缓存
//!
//! ## 核心能力
//!
//! - **查询描述**: select / group_by / where / order_by 的结构化表示 (query::types)
//! - **规范化键**: 与 map 键顺序无关的确定性缓存键 (query::canonical)
//! - **Rollup 路由**: 在固定的预聚合表目录中选择最小且正确的数据源 (query::router)
//! - **结果缓存**: LRU + TTL + 字节数上限，线程安全 (cache)
//! - **执行编排**: 缓存 → 路由 → 执行 → 失败回退原始数据 (query::service)
//!
//! ## 架构设计
//!
//! ```text
//! QueryDescriptor
//!     ↓
//! ResultCache::get ──命中──→ 返回
//!     ↓ 未命中
//! RollupRouter::route ──→ rollup 名称 | events_parquet
//!     ↓
//! QueryExecutor (外部存储引擎)
//!     ↓
//! ResultCache::put
//! ```

// ============================================================================
// 内部模块
// ============================================================================

/// 查询描述、规范化、目录与路由
pub mod query;

/// 查询结果缓存
pub mod cache;

/// 配置与日志
pub mod utils;

// ============================================================================
// 重导出常用类型
// ============================================================================

pub use cache::{CacheConfig, CacheStats, QueryResult, ResultCache, ResultValue};
pub use query::{
    canonicalize, CacheKey, QueryDescriptor, RollupCatalog, RollupDescriptor, RollupRouter,
    RouterConfig,
};

// ============================================================================
// 全局错误类型
// ============================================================================

/// 路由/缓存错误类型
///
/// 路由歧义、不支持的聚合函数、缓存容量不足都不是错误:
/// 前两者回退到原始数据源，后者通过淘汰解决。
#[derive(Debug, thiserror::Error)]
pub enum RollupError {
    #[error("Malformed query descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Execution failed on {source_name}: {message}")]
    Execution {
        source_name: String,
        message: String,
    },

    #[error("Rollup {rollup} cannot answer {item}")]
    UnsupportedOnRollup { rollup: String, item: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IOError(String),
}

impl From<serde_json::Error> for RollupError {
    fn from(e: serde_json::Error) -> Self {
        RollupError::SerializationError(e.to_string())
    }
}

impl From<std::io::Error> for RollupError {
    fn from(e: std::io::Error) -> Self {
        RollupError::IOError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RollupError>;

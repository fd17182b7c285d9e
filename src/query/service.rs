//! 查询执行编排
//!
//! 缓存 → 路由 → 执行 → (rollup 失败时) 原始数据重试 → 写缓存。
//! 存储引擎通过 [`QueryExecutor`] 注入，本模块不做任何 I/O。

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use super::router::RollupRouter;
use super::types::QueryDescriptor;
use crate::cache::{QueryResult, ResultCache};
use crate::{Result, RollupError};

/// 批量执行的默认并行度
pub const DEFAULT_BATCH_WORKERS: usize = 4;

/// 存储引擎错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Query failed: {0}")]
    Failed(String),
}

/// 存储引擎接口
///
/// `source` 为 rollup 名称或原始数据标记；descriptor 中的列与聚合项
/// 由实现方映射到具体表达式 (见 [`super::plan::MeasurePlan`])。
pub trait QueryExecutor: Send + Sync {
    fn execute(
        &self,
        source: &str,
        descriptor: &QueryDescriptor,
    ) -> std::result::Result<QueryResult, ExecutionError>;
}

/// 结果来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", content = "source", rename_all = "snake_case")]
pub enum ResultOrigin {
    Cached,
    Rollup(String),
    Raw(String),
    /// rollup 执行失败后由原始数据回答
    RawFallback { failed_rollup: String },
}

/// 单次查询结果
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub result: QueryResult,
    pub origin: ResultOrigin,
    pub elapsed: Duration,
}

impl QueryOutcome {
    pub fn is_cached(&self) -> bool {
        self.origin == ResultOrigin::Cached
    }
}

/// 查询服务
pub struct QueryService<E: QueryExecutor> {
    router: Arc<RollupRouter>,
    cache: Arc<ResultCache>,
    executor: Arc<E>,
    pool: Option<rayon::ThreadPool>,
}

impl<E: QueryExecutor> QueryService<E> {
    pub fn new(router: Arc<RollupRouter>, cache: Arc<ResultCache>, executor: Arc<E>) -> Self {
        Self {
            router,
            cache,
            executor,
            pool: None,
        }
    }

    /// 为批量执行使用独立线程池 (默认使用 rayon 全局池)
    pub fn with_batch_workers(mut self, workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("rollup-batch-{}", i))
            .build()
            .map_err(|e| RollupError::ConfigError(format!("batch pool: {}", e)))?;
        self.pool = Some(pool);
        Ok(self)
    }

    pub fn router(&self) -> &Arc<RollupRouter> {
        &self.router
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// 执行单个查询
    pub fn execute(&self, descriptor: &QueryDescriptor) -> Result<QueryOutcome> {
        descriptor.validate()?;
        let start = Instant::now();

        if let Some(result) = self.cache.get(descriptor) {
            return Ok(QueryOutcome {
                result,
                origin: ResultOrigin::Cached,
                elapsed: start.elapsed(),
            });
        }

        let source = self.router.route(descriptor);
        let (result, origin) = match self.executor.execute(&source, descriptor) {
            Ok(result) => {
                let origin = if self.router.catalog().is_raw_source(&source) {
                    ResultOrigin::Raw(source)
                } else {
                    ResultOrigin::Rollup(source)
                };
                (result, origin)
            }
            Err(e) if !self.router.catalog().is_raw_source(&source) => {
                log::warn!(
                    "query on rollup {} failed ({}), retrying on raw data",
                    source,
                    e
                );
                let result = self.execute_on_raw(descriptor)?;
                (
                    result,
                    ResultOrigin::RawFallback {
                        failed_rollup: source,
                    },
                )
            }
            Err(e) => {
                return Err(RollupError::Execution {
                    source_name: source,
                    message: e.to_string(),
                })
            }
        };

        // 缓存键始终是原始查询，而不是重试时的改写版本
        self.cache.put(descriptor, result.clone());

        Ok(QueryOutcome {
            result,
            origin,
            elapsed: start.elapsed(),
        })
    }

    fn execute_on_raw(&self, descriptor: &QueryDescriptor) -> Result<QueryResult> {
        let raw = self.router.catalog().raw_source().to_string();
        let retry = descriptor.clone().with_source(raw);
        let source = self.router.route(&retry);
        self.executor
            .execute(&source, &retry)
            .map_err(|e| RollupError::Execution {
                source_name: source,
                message: e.to_string(),
            })
    }

    /// 并行执行一批查询，返回顺序与输入一致
    pub fn run_batch(&self, descriptors: &[QueryDescriptor]) -> Vec<Result<QueryOutcome>> {
        let run = || {
            descriptors
                .par_iter()
                .map(|d| self.execute(d))
                .collect::<Vec<_>>()
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}

//! Rollup 路由器
//!
//! 根据查询描述在固定的 rollup 目录中选择最小且正确的数据源:
//! - 不支持的聚合函数 / 只存在于原始数据的分组列 → 直接走原始数据
//! - GROUP BY 必须被 rollup 维度覆盖
//! - 任何 WHERE 列不在 rollup 维度中 → 该 rollup 直接失去资格 (不是扣分)
//! - 精确维度匹配优先，其次按得分、维度数量、声明顺序
//!
//! 路由从不报错，最坏情况是回退到原始数据源 (正确但较慢)。

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use super::canonical::{canonicalize, CacheKey};
use super::catalog::{stored_sum_for, RollupCatalog, RollupDescriptor};
use super::types::{AggregateKind, QueryDescriptor};

// ═══════════════════════════════════════════════════════════════════════════
// 评分常量
// ═══════════════════════════════════════════════════════════════════════════
//
// 启发式常量，沿用线上取值。是否经过实测调优未知，修改前需要基准数据支撑。

/// 优先级权重: 每级优先级加 10 分
pub const PRIORITY_WEIGHT: i64 = 10;

/// 每个可下推到 rollup 的 WHERE 列加 2 分
pub const WHERE_PUSHDOWN_BONUS: i64 = 2;

/// 每个不可下推的 WHERE 列的启发式扣分
///
/// 只体现在 `RollupScore::heuristic_score` 中；实际路由时出现任何不可下推列，
/// 该 rollup 的结果都是错误的，直接取消资格。
pub const UNSUPPORTED_WHERE_PENALTY: i64 = 5;

/// 分组列与 rollup 维度精确一致时加 20 分
pub const EXACT_MATCH_BONUS: i64 = 20;

// ═══════════════════════════════════════════════════════════════════════════
// 路由决策
// ═══════════════════════════════════════════════════════════════════════════

/// rollup 失去资格的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "columns", rename_all = "snake_case")]
pub enum Disqualification {
    /// GROUP BY 列不在维度中
    GroupByNotCovered(Vec<String>),
    /// WHERE 列不在维度中，rollup 结果会是错误的人群
    UnsupportedWhereColumns(Vec<String>),
    /// 投影中的普通列不在维度中
    ProjectionNotCovered(Vec<String>),
    /// SUM/AVG 的列没有对应的存储度量
    MeasureNotStored(Vec<String>),
    /// 得分不为正
    NonPositiveScore,
}

/// 单个 rollup 的评分
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupScore {
    pub rollup: String,
    /// 生效得分，失去资格时为 0
    pub score: i64,
    /// 原始启发式得分 (包含不可下推列扣分)，仅供观察
    pub heuristic_score: i64,
    pub exact_match: bool,
    pub disqualification: Option<Disqualification>,
}

impl RollupScore {
    pub fn is_eligible(&self) -> bool {
        self.disqualification.is_none()
    }
}

/// 路由原因
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RouteReason {
    /// 查询显式指定了原始数据，或指定了能回答该查询的 rollup
    ExplicitOverride,
    /// 聚合函数不在 {COUNT, SUM, AVG} 中
    UnsupportedAggregate { function: String },
    /// 分组列只存在于原始数据中
    RawOnlyColumn { column: String },
    /// 没有合格的 rollup
    NoEligibleRollup,
    /// 选中得分最高的 rollup
    BestRollup { score: i64, exact_match: bool },
}

/// 完整路由决策 (用于 explain / 调试)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub source: String,
    pub reason: RouteReason,
    /// 按目录顺序的评分表，短路决策时为空
    pub candidates: Vec<RollupScore>,
}

impl RoutingDecision {
    fn short_circuit(source: &str, reason: RouteReason) -> Self {
        Self {
            source: source.to_string(),
            reason,
            candidates: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 路由器
// ═══════════════════════════════════════════════════════════════════════════

fn default_decision_cache_capacity() -> usize {
    10_000
}

/// 路由器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// 决策缓存容量，0 表示不限
    #[serde(default = "default_decision_cache_capacity")]
    pub decision_cache_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            decision_cache_capacity: default_decision_cache_capacity(),
        }
    }
}

/// 路由统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutingStats {
    /// route 调用总数
    pub total_routed: u64,
    /// 决策缓存命中
    pub decision_cache_hits: u64,
    /// 决策缓存未命中
    pub decision_cache_misses: u64,
    /// 每个数据源被选中的次数
    pub per_source: BTreeMap<String, u64>,
    /// 当前缓存的决策数
    pub cached_decisions: usize,
    /// 目录中的 rollup 数量
    pub rollup_count: usize,
}

fn decision_cache(capacity: usize) -> LruCache<CacheKey, String> {
    match NonZeroUsize::new(capacity) {
        Some(capacity) => LruCache::new(capacity),
        None => LruCache::unbounded(),
    }
}

struct RouterState {
    /// 决策缓存，按访问顺序淘汰
    decisions: LruCache<CacheKey, String>,
    stats: RoutingStats,
}

impl RouterState {
    fn record(&mut self, source: &str) {
        self.stats.total_routed += 1;
        *self.stats.per_source.entry(source.to_string()).or_insert(0) += 1;
    }
}

/// Rollup 路由器
///
/// 目录只读，决策缓存与统计在同一把锁内。
pub struct RollupRouter {
    catalog: RollupCatalog,
    config: RouterConfig,
    state: Mutex<RouterState>,
}

impl RollupRouter {
    pub fn new(catalog: RollupCatalog, config: RouterConfig) -> Self {
        log::info!(
            "rollup router initialised with {} rollups (raw source: {})",
            catalog.len(),
            catalog.raw_source()
        );
        let decisions = decision_cache(config.decision_cache_capacity);
        Self {
            catalog,
            config,
            state: Mutex::new(RouterState {
                decisions,
                stats: RoutingStats::default(),
            }),
        }
    }

    pub fn with_catalog(catalog: RollupCatalog) -> Self {
        Self::new(catalog, RouterConfig::default())
    }

    pub fn catalog(&self) -> &RollupCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// 路由查询，返回数据源名称 (rollup 名称或原始数据标记)
    pub fn route(&self, descriptor: &QueryDescriptor) -> String {
        let key = canonicalize(descriptor);

        {
            let mut state = self.state.lock();
            if let Some(source) = state.decisions.get(&key).cloned() {
                state.stats.decision_cache_hits += 1;
                state.record(&source);
                return source;
            }
        }

        // 决策计算是纯函数，不持锁
        let decision = self.decide(descriptor);
        log::debug!(
            "routed [{}] -> {} ({:?})",
            descriptor,
            decision.source,
            decision.reason
        );

        let mut state = self.state.lock();
        state.stats.decision_cache_misses += 1;
        state.record(&decision.source);
        state.decisions.put(key, decision.source.clone());
        decision.source
    }

    /// 计算完整路由决策 (不读写决策缓存)
    pub fn explain(&self, descriptor: &QueryDescriptor) -> RoutingDecision {
        self.decide(descriptor)
    }

    fn decide(&self, descriptor: &QueryDescriptor) -> RoutingDecision {
        let catalog = &self.catalog;
        let raw = catalog.raw_source();

        // 0. 显式指定原始数据 (如执行失败后重试)
        if let Some(source) = descriptor.source.as_deref() {
            if catalog.is_raw_source(source) {
                return RoutingDecision::short_circuit(source, RouteReason::ExplicitOverride);
            }
        }

        // 1. 不支持的聚合函数
        if let Some((kind, _)) = descriptor
            .aggregates()
            .find(|(kind, _)| !kind.is_rollup_compatible())
        {
            return RoutingDecision::short_circuit(
                raw,
                RouteReason::UnsupportedAggregate {
                    function: kind.name().to_string(),
                },
            );
        }

        // 2. 只存在于原始数据的分组列
        if let Some(column) = descriptor
            .group_by
            .iter()
            .find(|c| catalog.is_raw_only(c) || !catalog.is_dimension_anywhere(c))
        {
            return RoutingDecision::short_circuit(
                raw,
                RouteReason::RawOnlyColumn {
                    column: column.clone(),
                },
            );
        }

        // 3. 逐个 rollup 评分
        let profile = QueryProfile::new(descriptor, catalog);
        let candidates: Vec<RollupScore> = catalog
            .rollups()
            .iter()
            .map(|rollup| self.score(rollup, &profile))
            .collect();

        // 显式指定的 rollup 只有在合格时才采用，否则按常规路由
        let requested = descriptor
            .source
            .as_deref()
            .and_then(|source| candidates.iter().find(|c| c.rollup == source));
        if let Some(requested) = requested {
            if requested.is_eligible() {
                return RoutingDecision {
                    source: requested.rollup.clone(),
                    reason: RouteReason::ExplicitOverride,
                    candidates,
                };
            }
            log::debug!(
                "requested rollup {} cannot answer [{}] ({:?}), routing normally",
                requested.rollup,
                descriptor,
                requested.disqualification
            );
        }

        // 4. 精确匹配 > 得分 > 维度更少 > 声明顺序
        let best = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_eligible() && c.score > 0)
            .min_by_key(|(idx, c)| {
                (
                    !c.exact_match,
                    std::cmp::Reverse(c.score),
                    catalog.rollups()[*idx].dimensions.len(),
                    *idx,
                )
            })
            .map(|(_, c)| c);

        match best {
            Some(best) => RoutingDecision {
                source: best.rollup.clone(),
                reason: RouteReason::BestRollup {
                    score: best.score,
                    exact_match: best.exact_match,
                },
                candidates,
            },
            // 5. 没有合格 rollup
            None => RoutingDecision {
                source: raw.to_string(),
                reason: RouteReason::NoEligibleRollup,
                candidates,
            },
        }
    }

    fn score(&self, rollup: &RollupDescriptor, profile: &QueryProfile<'_>) -> RollupScore {
        let missing = |columns: &BTreeSet<&str>| -> Vec<String> {
            columns
                .iter()
                .filter(|c| !rollup.has_dimension(c))
                .map(|c| c.to_string())
                .collect()
        };

        let group_missing = missing(&profile.group_by);
        let where_missing = missing(&profile.where_columns);
        let projection_missing = missing(&profile.projected);
        let pushed_down = profile.where_columns.len() - where_missing.len();

        let effective_dims = self
            .catalog
            .effective_dimensions(rollup.dimensions.iter().map(String::as_str));
        let exact_match = group_missing.is_empty() && effective_dims == profile.effective_group_by;

        let mut heuristic_score = 0;
        if group_missing.is_empty() {
            heuristic_score += rollup.priority * PRIORITY_WEIGHT;
        }
        heuristic_score += pushed_down as i64 * WHERE_PUSHDOWN_BONUS;
        heuristic_score -= where_missing.len() as i64 * UNSUPPORTED_WHERE_PENALTY;
        if exact_match {
            heuristic_score += EXACT_MATCH_BONUS;
        }

        let disqualification = if !group_missing.is_empty() {
            Some(Disqualification::GroupByNotCovered(group_missing))
        } else if !where_missing.is_empty() {
            Some(Disqualification::UnsupportedWhereColumns(where_missing))
        } else if !projection_missing.is_empty() {
            Some(Disqualification::ProjectionNotCovered(projection_missing))
        } else if !profile.unstored_measures.is_empty() {
            Some(Disqualification::MeasureNotStored(
                profile.unstored_measures.clone(),
            ))
        } else if heuristic_score <= 0 {
            Some(Disqualification::NonPositiveScore)
        } else {
            None
        };

        RollupScore {
            rollup: rollup.name.clone(),
            score: if disqualification.is_none() {
                heuristic_score
            } else {
                0
            },
            heuristic_score,
            exact_match,
            disqualification,
        }
    }

    /// 清空决策缓存 (统计保留)
    pub fn clear_cache(&self) {
        let mut state = self.state.lock();
        state.decisions.clear();
        log::info!("routing decision cache cleared");
    }

    pub fn stats(&self) -> RoutingStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.cached_decisions = state.decisions.len();
        stats.rollup_count = self.catalog.len();
        stats
    }
}

impl Default for RollupRouter {
    fn default() -> Self {
        Self::with_catalog(RollupCatalog::standard())
    }
}

/// 评分所需的查询特征
struct QueryProfile<'a> {
    group_by: BTreeSet<&'a str>,
    effective_group_by: BTreeSet<&'a str>,
    where_columns: BTreeSet<&'a str>,
    projected: BTreeSet<&'a str>,
    /// 没有存储求和列的 SUM/AVG 列 (与具体 rollup 无关)
    unstored_measures: Vec<String>,
}

impl<'a> QueryProfile<'a> {
    fn new(descriptor: &'a QueryDescriptor, catalog: &RollupCatalog) -> Self {
        let unstored_measures = descriptor
            .aggregates()
            .filter(|(kind, column)| {
                matches!(kind, AggregateKind::Sum | AggregateKind::Avg)
                    && stored_sum_for(column).is_none()
            })
            .map(|(kind, column)| format!("{}({})", kind.name(), column))
            .collect();

        let group_by = descriptor.group_by_set();
        let effective_group_by = catalog.effective_dimensions(group_by.iter().copied());

        Self {
            group_by,
            effective_group_by,
            where_columns: descriptor.where_columns(),
            projected: descriptor.projected_columns().collect(),
            unstored_measures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::catalog::RAW_SOURCE;
    use crate::query::types::FilterOp;

    fn two_rollup_router() -> RollupRouter {
        let catalog = RollupCatalog::new(vec![
            RollupDescriptor::new("by_country_day", ["day", "country", "type"]),
            RollupDescriptor::new("by_country", ["country", "type"]),
        ])
        .unwrap();
        RollupRouter::with_catalog(catalog)
    }

    fn count_by(columns: &[&str]) -> QueryDescriptor {
        let mut q = QueryDescriptor::new().with_aggregate(AggregateKind::Count, "*");
        for c in columns {
            q = q.with_group_by(*c);
        }
        q
    }

    #[test]
    fn test_exact_match_prefers_smaller_rollup() {
        let router = two_rollup_router();
        assert_eq!(router.route(&count_by(&["country"])), "by_country");
    }

    #[test]
    fn test_where_column_forces_day_rollup() {
        let router = two_rollup_router();
        let q = count_by(&["country"]).with_filter("day", FilterOp::Eq, "2024-01-01");
        assert_eq!(router.route(&q), "by_country_day");

        let decision = router.explain(&q);
        let by_country = &decision.candidates[1];
        assert_eq!(by_country.score, 0);
        assert_eq!(
            by_country.disqualification,
            Some(Disqualification::UnsupportedWhereColumns(vec!["day".to_string()]))
        );
        // 启发式得分仍记录扣分: 1*10 - 5 + 20
        assert_eq!(by_country.heuristic_score, 25);
    }

    #[test]
    fn test_unsupported_where_column_routes_raw() {
        let router = two_rollup_router();
        let q = count_by(&["country"]).with_filter("user_id", FilterOp::Eq, 42i64);
        assert_eq!(router.route(&q), RAW_SOURCE);
        assert_eq!(router.explain(&q).reason, RouteReason::NoEligibleRollup);
    }

    #[test]
    fn test_unsupported_aggregate_routes_raw() {
        let router = RollupRouter::default();
        let q = QueryDescriptor::new()
            .with_aggregate(AggregateKind::parse("max"), "bid_price")
            .with_group_by("country");
        let decision = router.explain(&q);
        assert_eq!(decision.source, RAW_SOURCE);
        assert_eq!(
            decision.reason,
            RouteReason::UnsupportedAggregate {
                function: "MAX".to_string()
            }
        );
        assert!(decision.candidates.is_empty());
    }

    #[test]
    fn test_raw_only_group_column() {
        let router = RollupRouter::default();
        for column in ["auction_id", "ts", "not_a_column"] {
            let decision = router.explain(&count_by(&[column]));
            assert_eq!(decision.source, RAW_SOURCE);
            assert_eq!(
                decision.reason,
                RouteReason::RawOnlyColumn {
                    column: column.to_string()
                }
            );
        }
    }

    #[test]
    fn test_degenerate_group_by_uses_type_only() {
        let router = RollupRouter::default();
        assert_eq!(router.route(&count_by(&[])), "by_type_only");
        assert_eq!(router.route(&count_by(&["type"])), "by_type_only");

        // 只有 day 维度的过滤时，by_type_only 失去资格
        let q = count_by(&[]).with_filter("day", FilterOp::Gte, "2024-01-01");
        assert_eq!(router.route(&q), "by_day");
    }

    #[test]
    fn test_degenerate_group_by_without_type_only_rollup() {
        // 没有纯 {type} rollup 时，单组聚合仍由最窄的 rollup 回答 (对 cnt 求和即可)
        let router = two_rollup_router();
        let decision = router.explain(&count_by(&[]));
        assert_eq!(decision.source, "by_country");
        assert_eq!(
            decision.reason,
            RouteReason::BestRollup {
                score: 10,
                exact_match: false
            }
        );
    }

    #[test]
    fn test_unstored_measure_disqualifies() {
        let router = RollupRouter::default();
        let q = QueryDescriptor::new()
            .with_column("country")
            .with_aggregate(AggregateKind::Avg, "win_price")
            .with_group_by("country");
        let decision = router.explain(&q);
        assert_eq!(decision.source, RAW_SOURCE);
        assert!(decision.candidates.iter().all(|c| !c.is_eligible()));

        let q = QueryDescriptor::new()
            .with_column("country")
            .with_aggregate(AggregateKind::Avg, "bid_price")
            .with_group_by("country");
        assert_eq!(router.route(&q), "by_country");
    }

    #[test]
    fn test_explicit_override() {
        let router = RollupRouter::default();
        let q = count_by(&["country"]).with_source(RAW_SOURCE);
        assert_eq!(router.explain(&q).reason, RouteReason::ExplicitOverride);
        assert_eq!(router.route(&q), RAW_SOURCE);

        // 目录之外的名称 (逻辑表名) 不视为覆盖
        let q = count_by(&["country"]).with_source("events");
        assert_eq!(router.route(&q), "by_country");

        // 能回答查询的 rollup 可以被指定
        let q = count_by(&["country"]).with_source("by_publisher_country_day");
        assert_eq!(router.explain(&q).reason, RouteReason::ExplicitOverride);
        assert_eq!(router.route(&q), "by_publisher_country_day");
    }

    #[test]
    fn test_requested_rollup_cannot_bypass_where_check() {
        let router = RollupRouter::default();
        let q = count_by(&["country"])
            .with_filter("user_id", FilterOp::Eq, 42i64)
            .with_source("by_country");

        let decision = router.explain(&q);
        assert_eq!(decision.reason, RouteReason::NoEligibleRollup);
        assert_eq!(router.route(&q), RAW_SOURCE);

        // 指定的 rollup 不覆盖分组列时同样按常规路由
        let q = count_by(&["day"]).with_source("by_country");
        assert_eq!(router.route(&q), "by_day");
    }

    #[test]
    fn test_decision_cache_and_stats() {
        let router = two_rollup_router();
        let q = count_by(&["country"]);
        router.route(&q);
        router.route(&q);
        router.route(&count_by(&["country", "day"]));

        let stats = router.stats();
        assert_eq!(stats.total_routed, 3);
        assert_eq!(stats.decision_cache_hits, 1);
        assert_eq!(stats.decision_cache_misses, 2);
        assert_eq!(stats.cached_decisions, 2);
        assert_eq!(stats.per_source.get("by_country"), Some(&2));
        assert_eq!(stats.per_source.get("by_country_day"), Some(&1));
        assert_eq!(stats.rollup_count, 2);

        router.clear_cache();
        let stats = router.stats();
        assert_eq!(stats.cached_decisions, 0);
        assert_eq!(stats.total_routed, 3);

        router.route(&q);
        assert_eq!(router.stats().decision_cache_misses, 3);
    }

    #[test]
    fn test_bounded_decision_cache() {
        let router = RollupRouter::new(
            RollupCatalog::standard(),
            RouterConfig {
                decision_cache_capacity: 2,
            },
        );
        router.route(&count_by(&["country"]));
        router.route(&count_by(&["day"]));
        router.route(&count_by(&["country"]));
        router.route(&count_by(&["hour"]));

        let stats = router.stats();
        assert_eq!(stats.cached_decisions, 2);

        // day 是最久未使用的决策，已被淘汰
        router.route(&count_by(&["day"]));
        assert_eq!(router.stats().decision_cache_misses, 4);
        router.route(&count_by(&["hour"]));
        assert_eq!(router.stats().decision_cache_hits, 2);
    }
}

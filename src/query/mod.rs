//! 查询层
//!
//! ```text
//! QueryDescriptor (types)
//!     │
//!     ├── canonicalize (canonical) ──→ CacheKey
//!     │
//!     └── RollupRouter (router) ──→ RollupCatalog (catalog)
//!             │
//!             └── MeasurePlan (plan) ──→ 外部 SQL 组装
//!
//! QueryService (service): 缓存 → 路由 → 执行 → 回退
//! ```

pub mod canonical;
pub mod catalog;
pub mod plan;
pub mod router;
pub mod service;
pub mod types;

pub use canonical::{canonicalize, canonicalize_json, CacheKey, CanonicalValue, ToCanonical};
pub use catalog::{RollupCatalog, RollupDescriptor, TimeGranularity, RAW_SOURCE};
pub use plan::{MeasureExpr, MeasurePlan, PlannedColumn};
pub use router::{
    Disqualification, RollupRouter, RollupScore, RouteReason, RouterConfig, RoutingDecision,
    RoutingStats,
};
pub use service::{ExecutionError, QueryExecutor, QueryOutcome, QueryService, ResultOrigin};
pub use types::{
    AggregateKind, FilterOp, FilterValue, OrderBy, Predicate, QueryDescriptor, SelectItem,
    SortDirection,
};

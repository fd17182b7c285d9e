// 路由场景测试
//
// 覆盖：
// - 双 rollup 目录下的精确匹配 / WHERE 下推 / 原始数据回退
// - 标准 12 表目录下的典型报表查询
// - JSON 查询描述直接路由
//
// 运行：cargo test --test routing_scenarios

use rollup_router::query::types::{AggregateKind, FilterOp};
use rollup_router::query::{MeasurePlan, RouteReason, RAW_SOURCE};
use rollup_router::{QueryDescriptor, RollupCatalog, RollupDescriptor, RollupRouter};

fn two_rollup_router() -> RollupRouter {
    let catalog = RollupCatalog::new(vec![
        RollupDescriptor::new("by_country_day", ["day", "country", "type"]),
        RollupDescriptor::new("by_country", ["country", "type"]),
    ])
    .unwrap();
    RollupRouter::with_catalog(catalog)
}

fn count_by_country() -> QueryDescriptor {
    QueryDescriptor::new()
        .with_column("country")
        .with_aggregate(AggregateKind::Count, "*")
        .with_group_by("country")
}

// ============================================================================
// 双 rollup 目录
// ============================================================================

#[test]
fn test_group_by_country_uses_country_rollup() {
    let router = two_rollup_router();
    assert_eq!(router.route(&count_by_country()), "by_country");
}

#[test]
fn test_day_filter_uses_country_day_rollup() {
    let router = two_rollup_router();
    let q = count_by_country().with_filter("day", FilterOp::Eq, "2024-06-01");
    assert_eq!(router.route(&q), "by_country_day");
}

#[test]
fn test_user_filter_routes_raw() {
    let router = two_rollup_router();
    let q = count_by_country().with_filter("user_id", FilterOp::Eq, 42i64);
    assert_eq!(router.route(&q), RAW_SOURCE);

    let decision = router.explain(&q);
    assert_eq!(decision.reason, RouteReason::NoEligibleRollup);
    assert!(decision.candidates.iter().all(|c| !c.is_eligible()));
}

// ============================================================================
// 标准目录
// ============================================================================

#[test]
fn test_standard_catalog_reports() {
    let router = RollupRouter::default();

    let cases = vec![
        (
            QueryDescriptor::new()
                .with_column("day")
                .with_aggregate(AggregateKind::Sum, "bid_price")
                .with_group_by("day"),
            "by_day",
        ),
        (
            QueryDescriptor::new()
                .with_column("publisher_id")
                .with_column("country")
                .with_aggregate(AggregateKind::Avg, "total_price")
                .with_group_by("publisher_id")
                .with_group_by("country")
                .with_filter("day", FilterOp::Between, vec!["2024-06-01", "2024-06-07"]),
            "by_publisher_country_day",
        ),
        (
            QueryDescriptor::new()
                .with_column("hour")
                .with_aggregate(AggregateKind::Count, "*")
                .with_group_by("hour")
                .with_filter("day", FilterOp::Eq, "2024-06-01"),
            "by_hour",
        ),
        (
            QueryDescriptor::new()
                .with_column("advertiser_id")
                .with_aggregate(AggregateKind::Count, "*")
                .with_group_by("advertiser_id")
                .with_filter("type", FilterOp::Eq, "click"),
            "by_advertiser",
        ),
        (
            QueryDescriptor::new()
                .with_column("week")
                .with_aggregate(AggregateKind::Sum, "total_price")
                .with_group_by("week"),
            "by_week",
        ),
        (
            QueryDescriptor::new()
                .with_column("user_id")
                .with_aggregate(AggregateKind::Count, "*")
                .with_group_by("user_id"),
            RAW_SOURCE,
        ),
        (
            QueryDescriptor::new().with_aggregate(AggregateKind::parse("median"), "bid_price"),
            RAW_SOURCE,
        ),
    ];

    for (query, expected) in cases {
        assert_eq!(router.route(&query), expected, "query: {}", query);
    }
}

#[test]
fn test_json_descriptor_routing_and_plan() {
    let router = RollupRouter::default();
    let q = QueryDescriptor::from_json(
        r#"{
            "select": ["country", {"AVG": "bid_price"}, {"COUNT": "*"}],
            "group_by": ["country"],
            "where": [{"col": "type", "op": "eq", "val": "impression"}],
            "order_by": [{"col": "country", "dir": "asc"}]
        }"#,
    )
    .unwrap();

    let source = router.route(&q);
    assert_eq!(source, "by_country");

    let rollup = router.catalog().get(&source).unwrap();
    let plan = MeasurePlan::for_rollup(rollup, &q).unwrap();
    assert_eq!(
        plan.select_list(),
        vec![
            "country",
            "SUM(sum_bid) * 1.0 / NULLIF(SUM(cnt), 0) AS \"AVG(bid_price)\"",
            "SUM(cnt) AS \"COUNT(*)\"",
        ]
    );
}

#[test]
fn test_malformed_json_rejected() {
    assert!(QueryDescriptor::from_json(r#"{"select": []}"#).is_err());
    assert!(QueryDescriptor::from_json(r#"{"select": [{"COUNT": "*", "SUM": "x"}]}"#).is_err());
    assert!(QueryDescriptor::from_json("not json").is_err());
}

// 路由性能基准测试
//
// 使用 Criterion 框架测试：
// - 决策缓存命中路径
// - 完整评分路径 (explain，不经缓存)
// - 规范化键构建
//
// 运行: cargo bench --bench router_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use rollup_router::query::types::{AggregateKind, FilterOp};
use rollup_router::{canonicalize, QueryDescriptor, RollupCatalog, RollupRouter};

fn sample_queries() -> Vec<(&'static str, QueryDescriptor)> {
    vec![
        (
            "by_country",
            QueryDescriptor::new()
                .with_column("country")
                .with_aggregate(AggregateKind::Count, "*")
                .with_group_by("country"),
        ),
        (
            "country_day_filtered",
            QueryDescriptor::new()
                .with_column("country")
                .with_aggregate(AggregateKind::Avg, "bid_price")
                .with_group_by("country")
                .with_filter("day", FilterOp::Eq, "2024-06-01"),
        ),
        (
            "raw_only",
            QueryDescriptor::new()
                .with_aggregate(AggregateKind::Sum, "total_price")
                .with_filter("user_id", FilterOp::Eq, 42i64),
        ),
    ]
}

fn benchmark_route_cached(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_cached");
    let router = RollupRouter::with_catalog(RollupCatalog::standard());

    for (name, query) in sample_queries() {
        router.route(&query);
        group.bench_with_input(BenchmarkId::from_parameter(name), &query, |b, q| {
            b.iter(|| black_box(router.route(q)));
        });
    }

    group.finish();
}

fn benchmark_explain(c: &mut Criterion) {
    let mut group = c.benchmark_group("explain");
    let router = RollupRouter::with_catalog(RollupCatalog::standard());

    for (name, query) in sample_queries() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &query, |b, q| {
            b.iter(|| black_box(router.explain(q)));
        });
    }

    group.finish();
}

fn benchmark_canonicalize(c: &mut Criterion) {
    let queries = sample_queries();
    c.bench_function("canonicalize", |b| {
        b.iter(|| {
            for (_, q) in &queries {
                black_box(canonicalize(q));
            }
        });
    });
}

criterion_group!(
    benches,
    benchmark_route_cached,
    benchmark_explain,
    benchmark_canonicalize
);
criterion_main!(benches);

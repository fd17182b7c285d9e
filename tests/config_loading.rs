// 配置加载测试
//
// 运行：cargo test --test config_loading

use std::fs;
use std::time::Duration;
use tempfile::TempDir;

use rollup_router::query::types::AggregateKind;
use rollup_router::utils::AppConfig;
use rollup_router::{QueryDescriptor, RollupError};

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rollup.toml");
    fs::write(
        &path,
        r#"
[cache]
max_size_mb = 8
ttl_seconds = 120
max_entries = 64

[router]
decision_cache_capacity = 0

[catalog]
raw_source = "auction_events"
raw_only_columns = ["ts", "auction_id", "user_id", "ip"]

[[catalog.rollups]]
name = "by_region"
dimensions = ["region", "type"]
priority = 5

[[catalog.rollups]]
name = "by_region_day"
dimensions = ["region", "day", "type"]
time_granularity = "day"
has_time_dimension = true
priority = 5
"#,
    )
    .unwrap();

    let config = AppConfig::load_from_file(&path).unwrap();

    let cache = config.build_cache();
    assert_eq!(cache.config().max_size_bytes, 8 * 1024 * 1024);
    assert_eq!(cache.config().ttl, Duration::from_secs(120));
    assert_eq!(cache.config().max_entries, 64);

    let router = config.build_router().unwrap();
    assert_eq!(router.catalog().len(), 2);
    assert!(router.catalog().is_raw_only("ip"));

    let by_region = QueryDescriptor::new()
        .with_column("region")
        .with_aggregate(AggregateKind::Count, "*")
        .with_group_by("region");
    assert_eq!(router.route(&by_region), "by_region");

    let by_ip = QueryDescriptor::new()
        .with_aggregate(AggregateKind::Count, "*")
        .with_group_by("ip");
    assert_eq!(router.route(&by_ip), "auction_events");
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = AppConfig::load_from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, RollupError::ConfigError(_)));
}

#[test]
fn test_raw_source_collision_rejected() {
    let config = AppConfig::from_toml_str(
        r#"
[catalog]
raw_source = "by_country"
"#,
    )
    .unwrap();
    assert!(matches!(
        config.build_catalog(),
        Err(RollupError::ConfigError(_))
    ));
}

//! Rollup 目录
//!
//! 启动时由外部提供的预聚合表列表，运行期间只读，无需加锁。
//! 目录不验证这些表是否真实存在。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{Result, RollupError};

/// 原始数据源标记
pub const RAW_SOURCE: &str = "events_parquet";

/// rollup 中存储的计数列
pub const MEASURE_COUNT: &str = "cnt";

/// 可由 rollup 回答 SUM/AVG 的原始列及其存储列
///
/// 每个 rollup 固定存储 `{count, sum(bid_price), sum(total_price)}`，AVG 不预存。
pub const STORED_SUMS: [(&str, &str); 2] = [("bid_price", "sum_bid"), ("total_price", "sum_total")];

/// 原始列对应的 rollup 求和列
pub fn stored_sum_for(column: &str) -> Option<&'static str> {
    STORED_SUMS
        .iter()
        .find(|(raw, _)| *raw == column)
        .map(|(_, stored)| *stored)
}

/// 每个 rollup 都物理存储、但不算额外分组粒度的维度
pub const DEFAULT_IMPLICIT_DIMENSIONS: [&str; 1] = ["type"];

/// 只存在于原始数据中的高基数列
pub const DEFAULT_RAW_ONLY_COLUMNS: [&str; 3] = ["ts", "auction_id", "user_id"];

/// 时间粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGranularity {
    Minute,
    Hour,
    Day,
    Week,
}

fn default_priority() -> i64 {
    1
}

/// Rollup 描述 (目录条目)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupDescriptor {
    /// 唯一名称 (即物理表名)
    pub name: String,

    /// GROUP BY 维度
    pub dimensions: BTreeSet<String>,

    #[serde(default)]
    pub has_time_dimension: bool,

    #[serde(default)]
    pub time_granularity: Option<TimeGranularity>,

    /// 优先级，越高越优先
    #[serde(default = "default_priority")]
    pub priority: i64,
}

impl RollupDescriptor {
    pub fn new<I, S>(name: impl Into<String>, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            has_time_dimension: false,
            time_granularity: None,
            priority: default_priority(),
        }
    }

    pub fn with_time(mut self, granularity: TimeGranularity) -> Self {
        self.has_time_dimension = true;
        self.time_granularity = Some(granularity);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn has_dimension(&self, column: &str) -> bool {
        self.dimensions.contains(column)
    }
}

/// Rollup 目录
#[derive(Debug, Clone)]
pub struct RollupCatalog {
    rollups: Vec<RollupDescriptor>,
    implicit_dimensions: BTreeSet<String>,
    raw_only_columns: BTreeSet<String>,
    raw_source: String,
    /// 所有 rollup 维度的并集
    known_dimensions: BTreeSet<String>,
}

impl RollupCatalog {
    /// 创建目录并校验名称唯一
    pub fn new(rollups: Vec<RollupDescriptor>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for rollup in &rollups {
            if rollup.name.trim().is_empty() {
                return Err(RollupError::ConfigError(
                    "rollup name must not be empty".to_string(),
                ));
            }
            if !seen.insert(rollup.name.as_str()) {
                return Err(RollupError::ConfigError(format!(
                    "duplicate rollup name: {}",
                    rollup.name
                )));
            }
            if rollup.name == RAW_SOURCE {
                return Err(RollupError::ConfigError(format!(
                    "rollup name {} collides with the raw source",
                    rollup.name
                )));
            }
        }
        Ok(Self::from_rollups(rollups))
    }

    fn from_rollups(rollups: Vec<RollupDescriptor>) -> Self {
        let known_dimensions = rollups
            .iter()
            .flat_map(|r| r.dimensions.iter().cloned())
            .collect();
        Self {
            rollups,
            implicit_dimensions: DEFAULT_IMPLICIT_DIMENSIONS.iter().map(|s| s.to_string()).collect(),
            raw_only_columns: DEFAULT_RAW_ONLY_COLUMNS.iter().map(|s| s.to_string()).collect(),
            raw_source: RAW_SOURCE.to_string(),
            known_dimensions,
        }
    }

    /// 生产环境构建的 12 张 rollup 表
    pub fn standard() -> Self {
        use TimeGranularity::*;
        Self::from_rollups(vec![
            // 天级 rollup
            RollupDescriptor::new("by_day", ["day", "type"]).with_time(Day).with_priority(10),
            RollupDescriptor::new("by_country_day", ["day", "country", "type"])
                .with_time(Day)
                .with_priority(10),
            RollupDescriptor::new("by_publisher_day", ["day", "publisher_id", "type"])
                .with_time(Day)
                .with_priority(10),
            RollupDescriptor::new("by_advertiser_day", ["day", "advertiser_id", "type"])
                .with_time(Day)
                .with_priority(10),
            RollupDescriptor::new(
                "by_publisher_country_day",
                ["day", "publisher_id", "country", "type"],
            )
            .with_time(Day)
            .with_priority(10),
            // 细粒度时间 rollup
            RollupDescriptor::new("by_minute", ["minute", "day", "type"])
                .with_time(Minute)
                .with_priority(9),
            RollupDescriptor::new("by_hour", ["hour", "day", "type"])
                .with_time(Hour)
                .with_priority(9),
            RollupDescriptor::new("by_week", ["week", "type"])
                .with_time(Week)
                .with_priority(9),
            // 纯维度 rollup
            RollupDescriptor::new("by_country", ["country", "type"]).with_priority(8),
            RollupDescriptor::new("by_publisher", ["publisher_id", "type"]).with_priority(8),
            RollupDescriptor::new("by_advertiser", ["advertiser_id", "type"]).with_priority(8),
            RollupDescriptor::new("by_type_only", ["type"]).with_priority(7),
        ])
    }

    pub fn with_implicit_dimensions<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.implicit_dimensions = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_raw_only_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw_only_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// 替换原始数据源名称
    pub fn with_raw_source(mut self, raw_source: impl Into<String>) -> Result<Self> {
        let raw_source = raw_source.into();
        if raw_source.trim().is_empty() {
            return Err(RollupError::ConfigError(
                "raw source name must not be empty".to_string(),
            ));
        }
        if self.get(&raw_source).is_some() {
            return Err(RollupError::ConfigError(format!(
                "raw source {} collides with a rollup name",
                raw_source
            )));
        }
        self.raw_source = raw_source;
        Ok(self)
    }

    /// 按声明顺序返回所有 rollup
    pub fn rollups(&self) -> &[RollupDescriptor] {
        &self.rollups
    }

    pub fn get(&self, name: &str) -> Option<&RollupDescriptor> {
        self.rollups.iter().find(|r| r.name == name)
    }

    pub fn raw_source(&self) -> &str {
        &self.raw_source
    }

    pub fn is_raw_source(&self, name: &str) -> bool {
        self.raw_source == name
    }

    /// 是否为路由器可能返回的数据源 (rollup 或原始数据)
    pub fn is_known_source(&self, name: &str) -> bool {
        self.is_raw_source(name) || self.get(name).is_some()
    }

    /// 列是否出现在任何 rollup 的维度中
    pub fn is_dimension_anywhere(&self, column: &str) -> bool {
        self.known_dimensions.contains(column)
    }

    pub fn is_raw_only(&self, column: &str) -> bool {
        self.raw_only_columns.contains(column)
    }

    pub fn implicit_dimensions(&self) -> &BTreeSet<String> {
        &self.implicit_dimensions
    }

    /// 去除隐式维度后的分组粒度
    pub fn effective_dimensions<'a>(&self, columns: impl IntoIterator<Item = &'a str>) -> BTreeSet<&'a str> {
        columns
            .into_iter()
            .filter(|c| !self.implicit_dimensions.contains(*c))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rollups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rollups.is_empty()
    }
}

impl Default for RollupCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog() {
        let catalog = RollupCatalog::standard();
        assert_eq!(catalog.len(), 12);
        assert_eq!(catalog.raw_source(), RAW_SOURCE);
        assert!(catalog.is_dimension_anywhere("publisher_id"));
        assert!(!catalog.is_dimension_anywhere("user_id"));
        assert!(catalog.is_raw_only("auction_id"));

        let by_hour = catalog.get("by_hour").unwrap();
        assert_eq!(by_hour.time_granularity, Some(TimeGranularity::Hour));
        assert_eq!(by_hour.priority, 9);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = RollupCatalog::new(vec![
            RollupDescriptor::new("by_country", ["country"]),
            RollupDescriptor::new("by_country", ["country", "day"]),
        ])
        .unwrap_err();
        assert!(matches!(err, RollupError::ConfigError(_)));

        let err = RollupCatalog::new(vec![RollupDescriptor::new(RAW_SOURCE, ["day"])]).unwrap_err();
        assert!(matches!(err, RollupError::ConfigError(_)));
    }

    #[test]
    fn test_raw_source_override() {
        let catalog = RollupCatalog::new(vec![RollupDescriptor::new("by_day", ["day"])])
            .unwrap()
            .with_raw_source("events")
            .unwrap();
        assert!(catalog.is_known_source("events"));
        assert!(!catalog.is_known_source(RAW_SOURCE));

        assert!(catalog.clone().with_raw_source("by_day").is_err());
    }

    #[test]
    fn test_effective_dimensions() {
        let catalog = RollupCatalog::standard();
        let dims = catalog.effective_dimensions(["country", "type"]);
        assert_eq!(dims.into_iter().collect::<Vec<_>>(), vec!["country"]);
        assert_eq!(stored_sum_for("bid_price"), Some("sum_bid"));
        assert_eq!(stored_sum_for("price"), None);
    }
}

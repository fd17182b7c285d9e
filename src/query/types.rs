// 查询描述类型定义
//
// JSON 输入格式 (由外部查询源提供，此处只消费不重新设计):
//
// {"select": ["country", {"COUNT": "*"}, {"AVG": "bid_price"}],
//  "group_by": ["country"],
//  "where": [{"col": "day", "op": "eq", "val": "2024-01-01"}],
//  "order_by": [{"col": "COUNT(*)", "dir": "desc"}],
//  "from": "events"}

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{Result, RollupError};

// ═══════════════════════════════════════════════════════════════════════════
// 聚合与投影
// ═══════════════════════════════════════════════════════════════════════════

/// 聚合函数类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    /// 其他函数 (MIN/MAX/...)，rollup 无法回答
    Other(String),
}

impl AggregateKind {
    /// 解析函数名 (大小写不敏感)
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => AggregateKind::Count,
            "SUM" => AggregateKind::Sum,
            "AVG" => AggregateKind::Avg,
            other => AggregateKind::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Avg => "AVG",
            AggregateKind::Other(name) => name,
        }
    }

    /// rollup 只存储 count 和 sum，AVG 由 sum/count 合成
    pub fn is_rollup_compatible(&self) -> bool {
        !matches!(self, AggregateKind::Other(_))
    }
}

/// select 列表中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSelectItem", into = "RawSelectItem")]
pub enum SelectItem {
    /// 普通列
    Column(String),
    /// 聚合函数
    Aggregate { kind: AggregateKind, column: String },
}

impl SelectItem {
    pub fn column(name: impl Into<String>) -> Self {
        SelectItem::Column(name.into())
    }

    pub fn aggregate(kind: AggregateKind, column: impl Into<String>) -> Self {
        SelectItem::Aggregate {
            kind,
            column: column.into(),
        }
    }

    pub fn count_star() -> Self {
        Self::aggregate(AggregateKind::Count, "*")
    }

    /// 输出列名，如 `COUNT(*)`、`AVG(bid_price)`
    pub fn label(&self) -> String {
        match self {
            SelectItem::Column(name) => name.clone(),
            SelectItem::Aggregate { kind, column } => format!("{}({})", kind.name(), column),
        }
    }
}

/// select 项的 JSON 形态: `"country"` 或 `{"SUM": "bid_price"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawSelectItem {
    Column(String),
    Aggregate(BTreeMap<String, String>),
}

impl TryFrom<RawSelectItem> for SelectItem {
    type Error = String;

    fn try_from(raw: RawSelectItem) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawSelectItem::Column(name) => Ok(SelectItem::Column(name)),
            RawSelectItem::Aggregate(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "aggregate select item must have exactly one function, got {}",
                        map.len()
                    ));
                }
                let (func, column) = map.into_iter().next().ok_or("empty aggregate")?;
                Ok(SelectItem::Aggregate {
                    kind: AggregateKind::parse(&func),
                    column,
                })
            }
        }
    }
}

impl From<SelectItem> for RawSelectItem {
    fn from(item: SelectItem) -> Self {
        match item {
            SelectItem::Column(name) => RawSelectItem::Column(name),
            SelectItem::Aggregate { kind, column } => {
                let mut map = BTreeMap::new();
                map.insert(kind.name().to_string(), column);
                RawSelectItem::Aggregate(map)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 过滤条件
// ═══════════════════════════════════════════════════════════════════════════

/// 过滤操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,      // =
    Neq,     // !=
    Lt,      // <
    Lte,     // <=
    Gt,      // >
    Gte,     // >=
    Between, // BETWEEN low AND high
    In,      // IN (...)
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Between => "between",
            FilterOp::In => "in",
        }
    }
}

/// 过滤值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FilterValue>),
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// where 条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    #[serde(rename = "col")]
    pub column: String,
    pub op: FilterOp,
    #[serde(rename = "val", default = "null_value")]
    pub value: FilterValue,
}

fn null_value() -> FilterValue {
    FilterValue::Null
}

// ═══════════════════════════════════════════════════════════════════════════
// 排序
// ═══════════════════════════════════════════════════════════════════════════

/// 排序方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// order_by 项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    #[serde(rename = "col")]
    pub column: String,
    #[serde(rename = "dir", default)]
    pub direction: SortDirection,
}

// ═══════════════════════════════════════════════════════════════════════════
// 查询描述
// ═══════════════════════════════════════════════════════════════════════════

/// 查询描述
///
/// 路由只关心 `group_by` 的集合语义，输出列顺序由外部 SQL 组装器按原顺序处理。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// 投影列 (不能为空)
    #[serde(default)]
    pub select: Vec<SelectItem>,

    /// 分组列
    #[serde(default)]
    pub group_by: Vec<String>,

    /// 过滤条件 (合取，保持输入顺序)
    #[serde(rename = "where", default)]
    pub filters: Vec<Predicate>,

    /// 排序
    #[serde(default)]
    pub order_by: Vec<OrderBy>,

    /// 显式指定的数据源
    #[serde(rename = "from", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析 JSON 文本并校验
    pub fn from_json(text: &str) -> Result<Self> {
        let descriptor: QueryDescriptor = serde_json::from_str(text)
            .map_err(|e| RollupError::MalformedDescriptor(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// 从 JSON 值转换并校验
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let descriptor: QueryDescriptor = serde_json::from_value(value)
            .map_err(|e| RollupError::MalformedDescriptor(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// 校验描述是否完整 (不做列名层面的 schema 校验)
    pub fn validate(&self) -> Result<()> {
        if self.select.is_empty() {
            return Err(RollupError::MalformedDescriptor(
                "select list must not be empty".to_string(),
            ));
        }
        for item in &self.select {
            let name = match item {
                SelectItem::Column(name) => name,
                SelectItem::Aggregate { column, .. } => column,
            };
            if name.trim().is_empty() {
                return Err(RollupError::MalformedDescriptor(format!(
                    "select item {} has an empty column",
                    item.label()
                )));
            }
        }
        if let Some(p) = self.filters.iter().find(|p| p.column.trim().is_empty()) {
            return Err(RollupError::MalformedDescriptor(format!(
                "where predicate with op {} has an empty column",
                p.op.as_str()
            )));
        }
        Ok(())
    }

    pub fn with_column(mut self, name: impl Into<String>) -> Self {
        self.select.push(SelectItem::column(name));
        self
    }

    pub fn with_aggregate(mut self, kind: AggregateKind, column: impl Into<String>) -> Self {
        self.select.push(SelectItem::aggregate(kind, column));
        self
    }

    pub fn with_group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    pub fn with_filter(
        mut self,
        column: impl Into<String>,
        op: FilterOp,
        value: impl Into<FilterValue>,
    ) -> Self {
        self.filters.push(Predicate {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn with_order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 分组列集合
    pub fn group_by_set(&self) -> BTreeSet<&str> {
        self.group_by.iter().map(String::as_str).collect()
    }

    /// where 中引用的列集合
    pub fn where_columns(&self) -> BTreeSet<&str> {
        self.filters.iter().map(|p| p.column.as_str()).collect()
    }

    /// 投影中的普通列
    pub fn projected_columns(&self) -> impl Iterator<Item = &str> {
        self.select.iter().filter_map(|item| match item {
            SelectItem::Column(name) => Some(name.as_str()),
            SelectItem::Aggregate { .. } => None,
        })
    }

    /// 投影中的聚合项
    pub fn aggregates(&self) -> impl Iterator<Item = (&AggregateKind, &str)> {
        self.select.iter().filter_map(|item| match item {
            SelectItem::Aggregate { kind, column } => Some((kind, column.as_str())),
            SelectItem::Column(_) => None,
        })
    }

    pub fn has_aggregates(&self) -> bool {
        self.aggregates().next().is_some()
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let select: Vec<String> = self.select.iter().map(SelectItem::label).collect();
        write!(f, "SELECT {}", select.join(", "))?;
        if let Some(source) = &self.source {
            write!(f, " FROM {}", source)?;
        }
        if !self.filters.is_empty() {
            let preds: Vec<String> = self
                .filters
                .iter()
                .map(|p| format!("{} {}", p.column, p.op.as_str()))
                .collect();
            write!(f, " WHERE {}", preds.join(" AND "))?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", self.group_by.join(", "))?;
        }
        Ok(())
    }
}

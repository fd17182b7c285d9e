//! Rollup 度量映射
//!
//! rollup 表只存储 `cnt`、`sum_bid`、`sum_total`，查询中的聚合项需要改写:
//!
//! | 查询项            | rollup 表达式                                   |
//! |-------------------|-------------------------------------------------|
//! | COUNT(*)          | SUM(cnt)                                        |
//! | SUM(bid_price)    | SUM(sum_bid)                                    |
//! | AVG(bid_price)    | SUM(sum_bid) * 1.0 / NULLIF(SUM(cnt), 0)        |
//!
//! 输出列别名与原始查询保持一致，外部 SQL 组装器据此拼接语句。

use serde::Serialize;

use super::catalog::{stored_sum_for, RollupDescriptor, MEASURE_COUNT};
use super::types::{AggregateKind, QueryDescriptor, SelectItem};
use crate::{Result, RollupError};

/// rollup 上的列表达式
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum MeasureExpr {
    /// 维度列原样输出
    Dimension { column: String },
    /// 计数之和
    Count,
    /// 存储求和列之和
    Sum { stored: &'static str },
    /// 由 sum / count 合成的平均值
    Avg { stored: &'static str },
}

impl MeasureExpr {
    /// SQL 表达式片段
    pub fn sql_expr(&self) -> String {
        match self {
            MeasureExpr::Dimension { column } => column.clone(),
            MeasureExpr::Count => format!("SUM({})", MEASURE_COUNT),
            MeasureExpr::Sum { stored } => format!("SUM({})", stored),
            MeasureExpr::Avg { stored } => {
                format!("SUM({}) * 1.0 / NULLIF(SUM({}), 0)", stored, MEASURE_COUNT)
            }
        }
    }
}

/// 单个输出列
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedColumn {
    pub alias: String,
    pub expr: MeasureExpr,
}

/// 查询在某个 rollup 上的列映射
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasurePlan {
    pub rollup: String,
    pub columns: Vec<PlannedColumn>,
}

impl MeasurePlan {
    /// 为 rollup 生成列映射；rollup 无法提供的列返回错误
    pub fn for_rollup(rollup: &RollupDescriptor, descriptor: &QueryDescriptor) -> Result<Self> {
        let unsupported = |item: &SelectItem| RollupError::UnsupportedOnRollup {
            rollup: rollup.name.clone(),
            item: item.label(),
        };

        let mut columns = Vec::with_capacity(descriptor.select.len());
        for item in &descriptor.select {
            let expr = match item {
                SelectItem::Column(column) => {
                    if !rollup.has_dimension(column) {
                        return Err(unsupported(item));
                    }
                    MeasureExpr::Dimension {
                        column: column.clone(),
                    }
                }
                SelectItem::Aggregate { kind, column } => match kind {
                    AggregateKind::Count => MeasureExpr::Count,
                    AggregateKind::Sum => MeasureExpr::Sum {
                        stored: stored_sum_for(column).ok_or_else(|| unsupported(item))?,
                    },
                    AggregateKind::Avg => MeasureExpr::Avg {
                        stored: stored_sum_for(column).ok_or_else(|| unsupported(item))?,
                    },
                    AggregateKind::Other(_) => return Err(unsupported(item)),
                },
            };
            columns.push(PlannedColumn {
                alias: item.label(),
                expr,
            });
        }

        Ok(Self {
            rollup: rollup.name.clone(),
            columns,
        })
    }

    /// `expr AS "alias"` 形式的投影列表
    pub fn select_list(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| match &c.expr {
                MeasureExpr::Dimension { column } => column.clone(),
                expr => format!("{} AS \"{}\"", expr.sql_expr(), c.alias),
            })
            .collect()
    }
}

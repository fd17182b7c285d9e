//! 结果大小估算
//!
//! 按结果形状确定性地估算字节数:
//! - 序列 / map: 递归求和
//! - 数值标量 (int/float/bool): 固定 8 字节
//! - 文本: UTF-8 字节长度
//! - 日期 / 时间戳: 文本表示长度
//! - 无法归类的值 (null): 保守常量

use std::collections::BTreeMap;

use super::{QueryResult, ResultValue};

/// 数值标量的固定开销
pub const NUMERIC_SCALAR_BYTES: usize = 8;

/// 无法归类值的保守估计
pub const UNCLASSIFIED_VALUE_BYTES: usize = 16;

/// 估算内存占用
pub trait EstimateSize {
    fn estimated_size(&self) -> usize;
}

impl EstimateSize for str {
    fn estimated_size(&self) -> usize {
        self.len()
    }
}

impl EstimateSize for String {
    fn estimated_size(&self) -> usize {
        self.len()
    }
}

impl<T: EstimateSize> EstimateSize for [T] {
    fn estimated_size(&self) -> usize {
        self.iter().map(EstimateSize::estimated_size).sum()
    }
}

impl<T: EstimateSize> EstimateSize for Vec<T> {
    fn estimated_size(&self) -> usize {
        self.as_slice().estimated_size()
    }
}

impl<V: EstimateSize> EstimateSize for BTreeMap<String, V> {
    fn estimated_size(&self) -> usize {
        self.iter()
            .map(|(k, v)| k.estimated_size() + v.estimated_size())
            .sum()
    }
}

impl EstimateSize for ResultValue {
    fn estimated_size(&self) -> usize {
        match self {
            ResultValue::Bool(_) | ResultValue::Int(_) | ResultValue::Float(_) => {
                NUMERIC_SCALAR_BYTES
            }
            ResultValue::Text(s) => s.len(),
            ResultValue::Date(d) => d.to_string().len(),
            ResultValue::Timestamp(ts) => ts.to_string().len(),
            ResultValue::List(items) => items.estimated_size(),
            ResultValue::Map(map) => map.estimated_size(),
            ResultValue::Null => UNCLASSIFIED_VALUE_BYTES,
        }
    }
}

impl EstimateSize for QueryResult {
    fn estimated_size(&self) -> usize {
        self.columns.estimated_size() + self.rows.estimated_size()
    }
}

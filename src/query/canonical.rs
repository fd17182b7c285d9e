//! 规范化缓存键
//!
//! 查询描述先降为封闭的标签值模型 (标量 | 有序列表 | 键排序 map)，再序列化为紧凑字符串:
//! - map 的键在每一层都按字典序排序
//! - 列表保持输入顺序 (where 条件不做重排)
//! - 完整字符串本身就是键，不做有损哈希，语义不同的描述不会碰撞
//!
//! 路由器的决策缓存与结果缓存共用同一个键。

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::types::{FilterValue, OrderBy, Predicate, QueryDescriptor, SelectItem};

/// 规范化值
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<CanonicalValue>),
    Map(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// 从任意 JSON 值构造 (对象键排序，数组保持顺序)
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => CanonicalValue::Null,
            Value::Bool(b) => CanonicalValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CanonicalValue::Int(i),
                None => match n.as_f64() {
                    Some(f) => CanonicalValue::Float(f),
                    None => CanonicalValue::Text(n.to_string()),
                },
            },
            Value::String(s) => CanonicalValue::Text(s.clone()),
            Value::Array(items) => {
                CanonicalValue::List(items.iter().map(CanonicalValue::from_json).collect())
            }
            Value::Object(map) => CanonicalValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), CanonicalValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    fn text(s: &str) -> Self {
        CanonicalValue::Text(s.to_string())
    }

    /// 追加紧凑序列化结果
    pub fn write_to(&self, out: &mut String) {
        match self {
            CanonicalValue::Null => out.push_str("null"),
            CanonicalValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            CanonicalValue::Int(i) => out.push_str(&i.to_string()),
            // Debug 格式保留小数点，1.0 与整数 1 不会得到同一个键
            CanonicalValue::Float(f) => out.push_str(&format!("{:?}", f)),
            CanonicalValue::Text(s) => write_escaped(out, s),
            CanonicalValue::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_to(out);
                }
                out.push(']');
            }
            CanonicalValue::Map(map) => {
                out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_escaped(out, key);
                    out.push(':');
                    value.write_to(out);
                }
                out.push('}');
            }
        }
    }

    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }
}

fn write_escaped(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// 可降为规范化值的类型
pub trait ToCanonical {
    fn to_canonical(&self) -> CanonicalValue;
}

impl ToCanonical for FilterValue {
    fn to_canonical(&self) -> CanonicalValue {
        match self {
            FilterValue::Null => CanonicalValue::Null,
            FilterValue::Bool(b) => CanonicalValue::Bool(*b),
            FilterValue::Int(i) => CanonicalValue::Int(*i),
            FilterValue::Float(f) => CanonicalValue::Float(*f),
            FilterValue::Text(s) => CanonicalValue::Text(s.clone()),
            FilterValue::List(items) => {
                CanonicalValue::List(items.iter().map(ToCanonical::to_canonical).collect())
            }
        }
    }
}

impl ToCanonical for SelectItem {
    fn to_canonical(&self) -> CanonicalValue {
        match self {
            SelectItem::Column(name) => CanonicalValue::text(name),
            SelectItem::Aggregate { kind, column } => {
                let mut map = BTreeMap::new();
                map.insert(kind.name().to_string(), CanonicalValue::text(column));
                CanonicalValue::Map(map)
            }
        }
    }
}

impl ToCanonical for Predicate {
    fn to_canonical(&self) -> CanonicalValue {
        let mut map = BTreeMap::new();
        map.insert("col".to_string(), CanonicalValue::text(&self.column));
        map.insert("op".to_string(), CanonicalValue::text(self.op.as_str()));
        map.insert("val".to_string(), self.value.to_canonical());
        CanonicalValue::Map(map)
    }
}

impl ToCanonical for OrderBy {
    fn to_canonical(&self) -> CanonicalValue {
        let mut map = BTreeMap::new();
        map.insert("col".to_string(), CanonicalValue::text(&self.column));
        map.insert(
            "dir".to_string(),
            CanonicalValue::text(self.direction.as_str()),
        );
        CanonicalValue::Map(map)
    }
}

impl ToCanonical for QueryDescriptor {
    fn to_canonical(&self) -> CanonicalValue {
        fn list<T: ToCanonical>(items: &[T]) -> CanonicalValue {
            CanonicalValue::List(items.iter().map(ToCanonical::to_canonical).collect())
        }

        let mut map = BTreeMap::new();
        map.insert("select".to_string(), list(&self.select));
        map.insert(
            "group_by".to_string(),
            CanonicalValue::List(self.group_by.iter().map(|c| CanonicalValue::text(c)).collect()),
        );
        map.insert("where".to_string(), list(&self.filters));
        map.insert("order_by".to_string(), list(&self.order_by));
        if let Some(source) = &self.source {
            map.insert("from".to_string(), CanonicalValue::text(source));
        }
        CanonicalValue::Map(map)
    }
}

/// 规范化缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 计算查询描述的规范化键 (纯函数，可无锁并发调用)
pub fn canonicalize(descriptor: &QueryDescriptor) -> CacheKey {
    CacheKey(descriptor.to_canonical().to_canonical_string())
}

/// 对未类型化的 JSON 描述计算规范化键
pub fn canonicalize_json(value: &serde_json::Value) -> CacheKey {
    CacheKey(CanonicalValue::from_json(value).to_canonical_string())
}

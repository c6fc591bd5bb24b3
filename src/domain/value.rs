// ==========================================
// 汽车数据处理工具 - 单元格值与记录值
// ==========================================
// 职责: 定义表格单元格的标量值，以及模板解析所需的嵌套记录值
// 约束: 空白文本与 Empty 等价（非空率、字段映射均按此口径）
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// CellValue - 单元格标量值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// 是否为空（Empty 或仅含空白的文本）
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 由原始文本构造（去除首尾空白，空串视为 Empty）
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 数值视图（文本会尝试解析）
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// 是否为日历类值
    pub fn is_temporal(&self) -> bool {
        matches!(self, CellValue::Date(_) | CellValue::DateTime(_))
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Int(i) => write!(f, "{}", i),
            // 整数值的浮点保留一位小数（2.0 而不是 2）
            CellValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Int(i64::from(value))
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::DateTime(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

// ==========================================
// FieldValue - 嵌套记录值（标量 | 映射）
// ==========================================
// 用途: 模板解析按点分路径逐段下钻
// 缺失: 由 Option::None 表达，不单独建变体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(CellValue),
    Map(FieldMap),
}

/// 有序的字段映射（键 → 值）
pub type FieldMap = IndexMap<String, FieldValue>;

impl FieldValue {
    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            FieldValue::Map(map) => Some(map),
            FieldValue::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&CellValue> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            FieldValue::Map(_) => None,
        }
    }
}

impl From<CellValue> for FieldValue {
    fn from(value: CellValue) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<FieldMap> for FieldValue {
    fn from(value: FieldMap) -> Self {
        FieldValue::Map(value)
    }
}

/// 向 FieldMap 写入可选标量（None 不写入）
pub fn put_opt<V: Into<CellValue>>(map: &mut FieldMap, key: &str, value: Option<V>) {
    if let Some(v) = value {
        map.insert(key.to_string(), FieldValue::Scalar(v.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_text_is_empty() {
        assert!(CellValue::Empty.is_empty());
        assert!(CellValue::Text("   ".to_string()).is_empty());
        assert!(!CellValue::Text(" VIN ".to_string()).is_empty());
        assert!(!CellValue::Int(0).is_empty());
    }

    #[test]
    fn test_display_float_keeps_one_decimal() {
        assert_eq!(CellValue::Float(2.0).to_string(), "2.0");
        assert_eq!(CellValue::Float(1.984).to_string(), "1.984");
        assert_eq!(CellValue::Int(2020).to_string(), "2020");
    }

    #[test]
    fn test_from_text_trims() {
        assert_eq!(CellValue::from_text("  EA888 "), CellValue::Text("EA888".to_string()));
        assert_eq!(CellValue::from_text("  "), CellValue::Empty);
    }

    #[test]
    fn test_as_f64_parses_text() {
        assert_eq!(CellValue::Text("1.5".to_string()).as_f64(), Some(1.5));
        assert_eq!(CellValue::Text("abc".to_string()).as_f64(), None);
        assert_eq!(CellValue::Int(3).as_f64(), Some(3.0));
    }
}

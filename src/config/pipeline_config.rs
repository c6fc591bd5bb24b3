// ==========================================
// 汽车数据处理工具 - 结构化管道参数
// ==========================================
// 职责: 表头检测与校验规则的可调参数
// 说明: 关键词表与 0.30 非空率阈值为经验值，作为默认值而非硬约束
// ==========================================

use serde::{Deserialize, Serialize};

/// 默认表头关键词（中文与英文写法）
pub const DEFAULT_HEADER_KEYWORDS: &[&str] = &[
    "VIN", "码", "型号", "类型", "标准", "排量", "功率", "扭矩", "日期", "年份", "品牌", "制造商",
    "ID", "Code", "Name", "Type", "Model", "Standard", "Displacement", "Power", "Torque", "Date",
    "Year", "Brand", "Make", "Manufacturer",
];

// ==========================================
// HeaderDetectionConfig - 表头检测参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeaderDetectionConfig {
    pub max_check_rows: usize,    // 最多检查的行数
    pub min_non_empty_ratio: f64, // 非空率下限（低于则不可能是表头）
    pub keywords: Vec<String>,    // 子串命中任一即视为表头
}

impl Default for HeaderDetectionConfig {
    fn default() -> Self {
        Self {
            max_check_rows: 10,
            min_non_empty_ratio: 0.30,
            keywords: DEFAULT_HEADER_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl HeaderDetectionConfig {
    pub fn with_max_check_rows(mut self, rows: usize) -> Self {
        self.max_check_rows = rows;
        self
    }
}

// ==========================================
// ValidationConfig - 校验规则参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    pub identifier_category: String, // 车辆识别码所在类别
    pub identifier_field: String,    // 车辆识别码标准字段
    pub identifier_length: usize,    // 合法长度（字符数）
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            identifier_category: "vehicle_info".to_string(),
            identifier_field: "VIN".to_string(),
            identifier_length: 17,
        }
    }
}

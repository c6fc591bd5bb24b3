// ==========================================
// 汽车数据处理工具 - 结构化结果模型
// ==========================================
// 用途: 表格结构化管道的中间与最终产物
// 流程: Grid → RawRecord（按表头）→ CanonicalRecord（按类别映射）
// ==========================================

use crate::domain::value::{CellValue, FieldMap, FieldValue};
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 原始记录：源列名 → 单元格值（每个表头下方的数据行一条）
pub type RawRecord = IndexMap<String, CellValue>;

// ==========================================
// CanonicalRecord - 标准化记录
// ==========================================
// 红线: 字段存在 ⇔ 至少一个别名存在且非空；不存在则省略，不写 null
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub category: String,              // 所属类别（如 engine_info）
    pub sheet: String,                 // 来源工作表
    pub row_index: usize,              // 来源行号（网格内 0 基）
    pub fields: IndexMap<String, CellValue>,
}

impl CanonicalRecord {
    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 转为模板解析用的记录
    pub fn to_field_map(&self) -> FieldMap {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), FieldValue::Scalar(v.clone())))
            .collect()
    }
}

// ==========================================
// SheetResult - 单个工作表的结构化结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SheetContent {
    /// 检测到表头，按表头物化为 RawRecord
    Structured {
        header_row: usize,
        columns: Vec<String>,
        records: Vec<RawRecord>,
        row_indices: Vec<usize>, // 与 records 一一对应的网格行号
    },
    /// 无可用表头，原样携带矩阵，不参与标准化映射
    Raw { rows: Vec<Vec<CellValue>> },
    /// 工作表读取/解码失败（已记录日志，跳过）
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetResult {
    pub name: String,
    pub shape: (usize, usize),
    pub content: SheetContent,
    pub category: Option<String>,        // 首个命中的类别
    pub matched_categories: Vec<String>, // 全部命中的类别（>1 即存在歧义）
}

impl SheetResult {
    pub fn kind(&self) -> &'static str {
        match self.content {
            SheetContent::Structured { .. } => "structured",
            SheetContent::Raw { .. } => "raw",
            SheetContent::Error { .. } => "error",
        }
    }

    /// 结构化工作表的原始记录
    pub fn records(&self) -> &[RawRecord] {
        match &self.content {
            SheetContent::Structured { records, .. } => records,
            _ => &[],
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        self.matched_categories.len() > 1
    }
}

// ==========================================
// FileInfo - 文件基本信息
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub modified_time: Option<DateTime<Local>>,
    pub file_type: String, // excel / csv / memory
}

// ==========================================
// StructuredOutput - 一次结构化的完整输出
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredOutput {
    pub file_info: Option<FileInfo>,
    pub sheets: IndexMap<String, SheetResult>,
    pub categorized: IndexMap<String, Vec<CanonicalRecord>>,
}

impl StructuredOutput {
    pub fn total_records(&self) -> usize {
        self.categorized.values().map(Vec::len).sum()
    }

    pub fn records_of(&self, category: &str) -> &[CanonicalRecord] {
        self.categorized
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 查找某条标准化记录对应的原始记录
    pub fn raw_record_of(&self, record: &CanonicalRecord) -> Option<&RawRecord> {
        match &self.sheets.get(&record.sheet)?.content {
            SheetContent::Structured {
                records,
                row_indices,
                ..
            } => row_indices
                .iter()
                .position(|idx| *idx == record.row_index)
                .and_then(|pos| records.get(pos)),
            _ => None,
        }
    }
}

// ==========================================
// ValidationReport - 校验报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationStatistics {
    pub sheet_count: usize,
    pub category_counts: IndexMap<String, usize>, // 实际有数据的类别 → 记录数
    pub total_records: usize,
}

impl ValidationStatistics {
    /// 实际有数据的类别列表
    pub fn populated_categories(&self) -> Vec<String> {
        self.category_counts.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub statistics: ValidationStatistics,
}

// ==========================================
// 汽车数据处理工具 - 报告领域模型
// ==========================================
// 用途: 输出类型、占位符解析结果、渲染结果、批量汇总
// ==========================================

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 占位符 → 格式化文本（每次渲染临时生成，总是包含生成日期/时间）
pub type ResolvedFields = IndexMap<String, String>;

/// 生成日期占位符
pub const GENERATED_DATE_PLACEHOLDER: &str = "[生成日期]";
/// 生成时间占位符
pub const GENERATED_TIME_PLACEHOLDER: &str = "[生成时间]";

// ==========================================
// OutputKind - 输出类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    Tabular,           // 表格（xlsx）
    PaginatedDocument, // 分页文档（pdf）
    FlowDocument,      // 流式文档（docx）
}

impl OutputKind {
    pub const ALL: [OutputKind; 3] = [
        OutputKind::Tabular,
        OutputKind::PaginatedDocument,
        OutputKind::FlowDocument,
    ];

    /// 解析输出类型名称（不认识的名称返回 None）
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "tabular" | "excel" | "xlsx" => Some(OutputKind::Tabular),
            "paginated-document" | "pdf" => Some(OutputKind::PaginatedDocument),
            "flow-document" | "docx" | "word" => Some(OutputKind::FlowDocument),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Tabular => "tabular",
            OutputKind::PaginatedDocument => "paginated-document",
            OutputKind::FlowDocument => "flow-document",
        }
    }

    /// 产物文件扩展名
    pub fn extension(&self) -> &'static str {
        match self {
            OutputKind::Tabular => "xlsx",
            OutputKind::PaginatedDocument => "pdf",
            OutputKind::FlowDocument => "docx",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// RenderOutcome - 单次渲染结果
// ==========================================
// 说明: 能力缺失与渲染失败都不是异常，批量运行据此继续
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderOutcome {
    Rendered { path: PathBuf },
    Unavailable { kind: OutputKind },
    Failed { reason: String },
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RenderOutcome::Rendered { .. })
    }
}

// ==========================================
// BatchResult - 批量生成汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub index: usize, // 1 基，与输入顺序一致
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub success_count: usize,
    pub failed_count: usize,
    pub failed_items: Vec<FailedItem>,
    pub output_paths: Vec<String>,
}

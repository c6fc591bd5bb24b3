// ==========================================
// 汽车数据处理工具 - 渲染器
// ==========================================
// xlsx: 表格（rust_xlsxwriter）
// pdf:  分页文档（lopdf）
// docx: 流式文档（zip + quick-xml），支持模板文件占位符替换
// 未启用对应特性时渲染器仍注册，但 is_available() = false
// ==========================================

pub mod docx;
pub mod pdf;
pub mod xlsx;

pub use docx::{write_skeleton_template, DocxRenderer};
pub use pdf::PdfRenderer;
pub use xlsx::XlsxRenderer;

use crate::config::TemplateConfig;
use crate::domain::ResolvedFields;
use crate::i18n::t;
use crate::report::dispatch::ReportRenderer;

pub fn default_renderers() -> Vec<Box<dyn ReportRenderer>> {
    vec![
        Box::new(XlsxRenderer),
        Box::new(PdfRenderer),
        Box::new(DocxRenderer),
    ]
}

/// 占位符 → 表格中的字段名（去掉外层方括号）
pub fn field_label(placeholder: &str) -> &str {
    placeholder
        .strip_prefix('[')
        .and_then(|p| p.strip_suffix(']'))
        .unwrap_or(placeholder)
}

/// 字段/值两列数据
pub fn field_rows(fields: &ResolvedFields) -> Vec<(&str, &str)> {
    fields
        .iter()
        .map(|(k, v)| (field_label(k), v.as_str()))
        .collect()
}

/// 报告标题（模板未指定时用本地化标题）
pub fn report_title(template: &TemplateConfig) -> String {
    template
        .title
        .clone()
        .unwrap_or_else(|| t("report.title"))
}

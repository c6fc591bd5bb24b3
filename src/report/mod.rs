// ==========================================
// 汽车数据处理工具 - 报告层
// ==========================================
// 职责: 模板解析 → 渲染分发 → 批量生成
// 输出: tabular (xlsx) / paginated-document (pdf) / flow-document (docx)
// ==========================================

pub mod batch;
pub mod dispatch;
pub mod error;
pub mod renderers;
pub mod resolver;

pub use batch::{BatchRunner, BATCH_TIMESTAMP_FORMAT};
pub use dispatch::{RenderDispatch, RenderRequest, ReportRenderer};
pub use error::{ReportError, ReportResult};
pub use renderers::{field_label, write_skeleton_template, DocxRenderer, PdfRenderer, XlsxRenderer};
pub use resolver::{lookup_path, TemplateResolver, TIME_FORMAT};

// ==========================================
// 汽车数据处理工具 - API 层
// ==========================================
// 职责: 提供业务 API 接口，供命令行调用
// ==========================================

pub mod error;
pub mod import_api;
pub mod query_api;
pub mod report_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::{BatchImportItem, BatchImportResponse, ImportApi, DEFAULT_PREVIEW_ROWS};
pub use query_api::QueryApi;
pub use report_api::{
    CreateTemplateRequest, GenerateReportResponse, OutputKindInfo, ReportApi, TemplateSummary,
    TemplateValidation,
};

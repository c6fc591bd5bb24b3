// ==========================================
// 汽车数据处理工具 - 核心库
// ==========================================
// 流程: 表格读取 → 表头识别 → 结构化 → 校验 → 入库 → 模板解析 → 报告渲染
// 技术栈: Rust + SQLite
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 值类型与实体
pub mod domain;

// 配置层 - 字段映射 / 模板 / 路径
pub mod config;

// 导入层 - 表格读取与结构化
pub mod importer;

// 数据仓储层 - 数据访问
pub mod repository;

// 报告层 - 模板解析与渲染
pub mod report;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 状态组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    BatchResult, CellValue, FieldMap, FieldValue, Grid, OutputKind, RenderOutcome,
    ResolvedFields, StructuredOutput, ValidationReport, VehicleProfile,
};

// 配置
pub use config::{AppConfig, FieldMappingConfig, FieldMappingRegistry, TemplateConfig, TemplateRegistry};

// 核心组件
pub use importer::{HeaderDetector, RawGridLoader, Structurer, Validator};
pub use report::{BatchRunner, RenderDispatch, TemplateResolver};

// API
pub use api::{ImportApi, QueryApi, ReportApi};
pub use app::AppState;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "汽车数据处理工具";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

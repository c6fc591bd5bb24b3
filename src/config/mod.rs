// ==========================================
// 汽车数据处理工具 - 配置层
// ==========================================
// 职责: 字段映射 / 模板 / 管道参数 / 应用路径
// 约束: 进程级注册表只通过单一入口更新，读者持有不可变快照
// ==========================================

pub mod app_config;
pub mod error;
pub mod field_mapping;
pub mod pipeline_config;
pub mod template_config;

pub use app_config::AppConfig;
pub use error::{ConfigError, ConfigResult};
pub use field_mapping::{CategoryMapping, FieldMappingConfig, FieldMappingRegistry};
pub use pipeline_config::{HeaderDetectionConfig, ValidationConfig, DEFAULT_HEADER_KEYWORDS};
pub use template_config::{
    builtin_templates, TemplateConfig, TemplateRegistry, TemplateTable, PATH_SEPARATOR,
};

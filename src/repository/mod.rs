// ==========================================
// 汽车数据处理工具 - 数据仓储层
// ==========================================
// 职责: 提供数据访问接口，屏蔽数据库细节
// 红线: Repository 不含业务逻辑
// 约束: 所有查询使用参数化，防止 SQL 注入
// ==========================================

pub mod data_source_repo;
pub mod error;
pub mod schema;
pub mod template_repo;
pub mod test_report_repo;
pub mod vehicle_repo;

// 重导出核心仓储
pub use data_source_repo::DataSourceRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use schema::ensure_schema;
pub use template_repo::{to_template_config, TemplateRepository};
pub use test_report_repo::TestReportRepository;
pub use vehicle_repo::{SaveSummary, VehicleRepository};

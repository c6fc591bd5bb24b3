// ==========================================
// 汽车数据处理工具 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和 API 实例
// 启动顺序:
// 1. 解析路径并创建目录
// 2. 打开共享数据库连接，建表
// 3. 初始化注册表（字段映射读配置文件，模板回灌已持久化的记录）
// 4. 创建各 API 实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{ImportApi, QueryApi, ReportApi};
use crate::config::{AppConfig, FieldMappingRegistry, TemplateRegistry};
use crate::db::open_sqlite_connection;
use crate::importer::VehicleImporterImpl;
use crate::report::{RenderDispatch, TemplateResolver};
use crate::repository::{
    ensure_schema, DataSourceRepository, TemplateRepository, TestReportRepository,
    VehicleRepository,
};

/// 应用状态
///
/// 包含所有 API 实例和共享资源
pub struct AppState {
    /// 路径配置
    pub config: AppConfig,

    /// 导入 API
    pub import_api: Arc<ImportApi>,

    /// 查询 API
    pub query_api: Arc<QueryApi>,

    /// 报告 API
    pub report_api: Arc<ReportApi>,

    /// 字段映射注册表（导入与映射导出共用）
    pub mappings: Arc<FieldMappingRegistry>,

    /// 模板注册表
    pub templates: Arc<TemplateRegistry>,
}

impl AppState {
    /// 按环境变量 / 默认目录创建
    pub fn from_env() -> Result<Self, String> {
        Self::new(AppConfig::from_env())
    }

    /// 创建新的 AppState 实例
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(config: AppConfig) -> Result<Self, String> {
        tracing::info!(db = %config.db_path.display(), "初始化AppState");

        config
            .ensure_dirs()
            .map_err(|e| format!("无法创建数据目录: {}", e))?;

        // 创建数据库连接（共享连接）
        let conn = open_sqlite_connection(&config.db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let vehicle_repo = Arc::new(VehicleRepository::from_connection(conn.clone()));
        let data_source_repo = Arc::new(DataSourceRepository::from_connection(conn.clone()));
        let test_report_repo = Arc::new(TestReportRepository::from_connection(conn.clone()));
        let template_repo = Arc::new(TemplateRepository::from_connection(conn));

        // ==========================================
        // 初始化注册表
        // ==========================================
        let mappings = Arc::new(FieldMappingRegistry::default());
        if config.mapping_config_path.exists() {
            mappings
                .load_file(&config.mapping_config_path)
                .map_err(|e| format!("字段映射配置加载失败: {}", e))?;
        }

        let templates = Arc::new(TemplateRegistry::default());
        let stored = template_repo
            .load_active_configs()
            .map_err(|e| format!("已保存模板读取失败: {}", e))?;
        let restored = stored.len();
        for template in stored {
            templates
                .register(template)
                .map_err(|e| format!("已保存模板无效: {}", e))?;
        }
        tracing::info!(restored, "模板注册表初始化完成");

        // ==========================================
        // 初始化报告层
        // ==========================================
        let resolver = Arc::new(TemplateResolver::new(templates.clone()));
        let dispatch = Arc::new(RenderDispatch::new(&config.template_dir));

        // ==========================================
        // 创建API实例
        // ==========================================
        let importer = Arc::new(VehicleImporterImpl::new(
            vehicle_repo.clone(),
            data_source_repo.clone(),
            mappings.clone(),
        ));
        let import_api = Arc::new(ImportApi::new(
            importer,
            mappings.clone(),
            data_source_repo,
        ));
        let query_api = Arc::new(QueryApi::new(vehicle_repo.clone(), test_report_repo.clone()));
        let report_api = Arc::new(ReportApi::new(
            vehicle_repo,
            test_report_repo,
            template_repo,
            resolver,
            dispatch,
        ));

        tracing::info!("AppState初始化成功");
        Ok(Self {
            config,
            import_api,
            query_api,
            report_api,
            mappings,
            templates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CreateTemplateRequest;
    use indexmap::IndexMap;

    #[test]
    fn test_created_templates_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::rooted_at(dir.path());

        {
            let state = AppState::new(config.clone()).unwrap();
            let mut fields = IndexMap::new();
            fields.insert("[VIN码]".to_string(), "vin".to_string());
            state
                .report_api
                .create_template(CreateTemplateRequest {
                    name: "vin_only".to_string(),
                    kind: "xlsx".to_string(),
                    title: None,
                    fields,
                })
                .unwrap();
        }

        let state = AppState::new(config).unwrap();
        assert!(state.templates.contains("vin_only"));
        assert!(state.templates.contains("vehicle_basic_info"));
    }

    #[test]
    fn test_mapping_file_loaded_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::rooted_at(dir.path());
        std::fs::write(
            &config.mapping_config_path,
            r#"{"chassis_info": {"sheet_patterns": ["底盘"], "field_aliases": {"wheelbase": ["轴距"]}}}"#,
        )
        .unwrap();

        let state = AppState::new(config).unwrap();
        let mapping = state.mappings.snapshot().unwrap();
        assert!(mapping.category("chassis_info").is_ok());
        assert!(mapping.category("vehicle_info").is_ok());
    }
}

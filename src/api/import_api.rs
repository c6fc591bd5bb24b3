// ==========================================
// 车辆数据导入 API
// ==========================================
// 职责: 封装文件导入 / 预览 / 预检 / 字段映射维护
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{FieldMappingConfig, FieldMappingRegistry};
use crate::domain::{DataSource, ValidationReport};
use crate::importer::{FilePreview, ImportOutcome, VehicleImporter, VehicleImporterImpl};
use crate::repository::DataSourceRepository;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// 预览默认行数
pub const DEFAULT_PREVIEW_ROWS: usize = 10;

/// 批量导入响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchImportResponse {
    /// 处理完成（落库成功）的文件数
    pub completed: usize,
    /// 校验失败或导入出错的文件数
    pub failed: usize,
    /// 与输入顺序一致的逐文件结果
    pub items: Vec<BatchImportItem>,
}

/// 批量导入中单个文件的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchImportItem {
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ImportOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 导入 API
pub struct ImportApi {
    importer: Arc<VehicleImporterImpl>,
    mappings: Arc<FieldMappingRegistry>,
    data_sources: Arc<DataSourceRepository>,
}

impl ImportApi {
    pub fn new(
        importer: Arc<VehicleImporterImpl>,
        mappings: Arc<FieldMappingRegistry>,
        data_sources: Arc<DataSourceRepository>,
    ) -> Self {
        Self {
            importer,
            mappings,
            data_sources,
        }
    }

    // ==========================================
    // 文件导入
    // ==========================================

    /// 导入单个文件
    ///
    /// # 返回
    /// - Ok(ImportOutcome): 文件已处理；校验不通过时 status = failed 且未落库
    /// - Err(ApiError): 文件不存在 / 格式不支持 / 读取或落库失败
    pub async fn import_file(&self, file_path: &str) -> ApiResult<ImportOutcome> {
        let path = non_empty_path(file_path)?;
        Ok(self.importer.import_file(path).await?)
    }

    /// 并发导入多个文件（单个文件失败不影响其他文件）
    pub async fn import_files(&self, file_paths: &[String]) -> ApiResult<BatchImportResponse> {
        if file_paths.is_empty() {
            return Err(ApiError::InvalidInput("文件列表不能为空".to_string()));
        }
        let paths = file_paths
            .iter()
            .map(|p| non_empty_path(p))
            .collect::<ApiResult<Vec<_>>>()?;

        let results = self.importer.import_files(paths).await;

        let items: Vec<BatchImportItem> = file_paths
            .iter()
            .zip(results)
            .map(|(file_path, result)| match result {
                Ok(outcome) => BatchImportItem {
                    file_path: file_path.clone(),
                    outcome: Some(outcome),
                    error: None,
                },
                Err(error) => BatchImportItem {
                    file_path: file_path.clone(),
                    outcome: None,
                    error: Some(error),
                },
            })
            .collect();

        let completed = items
            .iter()
            .filter(|i| i.outcome.as_ref().is_some_and(|o| o.is_completed()))
            .count();
        Ok(BatchImportResponse {
            completed,
            failed: items.len() - completed,
            items,
        })
    }

    // ==========================================
    // 预览 / 预检（不落库）
    // ==========================================

    pub fn preview_file(&self, file_path: &str, max_rows: Option<usize>) -> ApiResult<FilePreview> {
        let path = non_empty_path(file_path)?;
        Ok(self
            .importer
            .preview_file(&path, max_rows.unwrap_or(DEFAULT_PREVIEW_ROWS))?)
    }

    pub fn check_file(&self, file_path: &str) -> ApiResult<ValidationReport> {
        let path = non_empty_path(file_path)?;
        Ok(self.importer.check_file(&path)?)
    }

    // ==========================================
    // 数据源记录
    // ==========================================

    pub fn list_batch_sources(&self, batch_id: &str) -> ApiResult<Vec<DataSource>> {
        Ok(self.data_sources.list_by_batch(batch_id)?)
    }

    pub fn list_recent_sources(&self, limit: usize) -> ApiResult<Vec<DataSource>> {
        Ok(self.data_sources.list_recent(limit)?)
    }

    // ==========================================
    // 字段映射维护
    // ==========================================

    /// 当前生效的字段映射（只读副本）
    pub fn current_mapping(&self) -> ApiResult<FieldMappingConfig> {
        let snapshot = self.mappings.snapshot()?;
        Ok(FieldMappingConfig::clone(&snapshot))
    }

    /// 合并一份映射配置（同名类别整体替换）
    pub fn configure_mapping(&self, config: FieldMappingConfig) -> ApiResult<()> {
        Ok(self.mappings.configure(config)?)
    }

    pub fn load_mapping(&self, file_path: &str) -> ApiResult<()> {
        let path = non_empty_path(file_path)?;
        if !path.exists() {
            return Err(ApiError::NotFound(format!("文件不存在: {}", file_path)));
        }
        self.mappings.load_file(&path)?;
        Ok(())
    }

    pub fn export_mapping(&self, file_path: &str) -> ApiResult<()> {
        let path = non_empty_path(file_path)?;
        self.mappings.save_file(&path)?;
        info!(path = %path.display(), "字段映射配置已导出");
        Ok(())
    }
}

fn non_empty_path(raw: &str) -> ApiResult<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidInput("文件路径不能为空".to_string()));
    }
    Ok(Path::new(trimmed).to_path_buf())
}

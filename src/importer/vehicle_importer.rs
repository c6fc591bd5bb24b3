// ==========================================
// 汽车数据处理工具 - 车辆数据导入器
// ==========================================
// 流程:
// 1. 登记数据源（pending → processing）
// 2. 读取文件 → 结构化（使用字段映射快照）
// 3. 校验（不通过 → failed，不落库）
// 4. 组装车辆聚合 → 单事务落库 → completed
// 并发: 每个文件在阻塞线程池内独立执行，批量导入互不影响
// ==========================================

use crate::config::{
    FieldMappingConfig, FieldMappingRegistry, HeaderDetectionConfig, ValidationConfig,
};
use crate::domain::{ProcessingStatus, StructuredOutput, ValidationReport};
use crate::importer::assembler::VehicleAssembler;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::grid_loader::{read_file_info, RawGridLoader};
use crate::importer::header_detector::HeaderDetector;
use crate::importer::structurer::{FilePreview, Structurer};
use crate::importer::validator::Validator;
use crate::repository::{DataSourceRepository, SaveSummary, VehicleRepository};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// 单个文件的导入结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub batch_id: String,
    pub data_source_id: i64,
    pub file_name: String,
    pub status: ProcessingStatus,
    pub validation: ValidationReport,
    pub summary: Option<SaveSummary>, // 校验不通过时为 None
    pub warnings: Vec<String>,        // 组装阶段的告警
    pub elapsed_ms: u64,
}

impl ImportOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == ProcessingStatus::Completed
    }
}

// ==========================================
// VehicleImporter Trait
// ==========================================
// 实现者: VehicleImporterImpl
#[async_trait]
pub trait VehicleImporter: Send + Sync {
    /// 导入单个文件
    ///
    /// # 返回
    /// - Ok(ImportOutcome): 文件已处理（校验失败同样返回 Ok，status = failed）
    /// - Err: 文件不存在 / 格式不支持 / 读取或落库失败
    async fn import_file(&self, path: PathBuf) -> ImportResult<ImportOutcome>;

    /// 并发导入多个文件（共享一个批次号）
    ///
    /// 单个文件失败不影响其他文件，结果与输入顺序一致
    async fn import_files(&self, paths: Vec<PathBuf>) -> Vec<Result<ImportOutcome, String>>;
}

// ==========================================
// VehicleImporterImpl
// ==========================================
#[derive(Clone)]
pub struct VehicleImporterImpl {
    vehicles: Arc<VehicleRepository>,
    data_sources: Arc<DataSourceRepository>,
    mappings: Arc<FieldMappingRegistry>,
    header_config: HeaderDetectionConfig,
    validation_config: ValidationConfig,
}

impl VehicleImporterImpl {
    pub fn new(
        vehicles: Arc<VehicleRepository>,
        data_sources: Arc<DataSourceRepository>,
        mappings: Arc<FieldMappingRegistry>,
    ) -> Self {
        Self {
            vehicles,
            data_sources,
            mappings,
            header_config: HeaderDetectionConfig::default(),
            validation_config: ValidationConfig::default(),
        }
    }

    pub fn with_header_config(mut self, config: HeaderDetectionConfig) -> Self {
        self.header_config = config;
        self
    }

    pub fn with_validation_config(mut self, config: ValidationConfig) -> Self {
        self.validation_config = config;
        self
    }

    /// 在后台阻塞线程池内执行整条管道
    async fn import_in_batch(&self, path: PathBuf, batch_id: String) -> ImportResult<ImportOutcome> {
        let importer = self.clone();
        tokio::task::spawn_blocking(move || importer.run_pipeline(&path, &batch_id))
            .await
            .map_err(|e| ImportError::InternalError(format!("导入任务异常终止: {}", e)))?
    }

    /// 同步导入管道
    #[instrument(skip(self))]
    pub fn run_pipeline(&self, path: &Path, batch_id: &str) -> ImportResult<ImportOutcome> {
        let start = Instant::now();

        // === 步骤 0: 前置检查（不登记数据源）===
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        if !RawGridLoader::is_supported(path) {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file_type = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let file_info = read_file_info(path, &file_type)?;
        let source_id = self.data_sources.create(batch_id, &file_info)?;
        info!(file = %file_info.file_name, source_id, "开始导入车辆数据");

        self.data_sources
            .update_status(source_id, ProcessingStatus::Processing, None)?;

        match self.process(path, &file_info.file_name) {
            Ok((validation, saved)) => {
                let (status, summary, warnings, message) = match saved {
                    Some((summary, warnings)) => {
                        (ProcessingStatus::Completed, Some(summary), warnings, None)
                    }
                    None => (
                        ProcessingStatus::Failed,
                        None,
                        Vec::new(),
                        Some(validation.errors.join("; ")),
                    ),
                };
                self.data_sources
                    .update_status(source_id, status, message.as_deref())?;

                let elapsed_ms = start.elapsed().as_millis() as u64;
                info!(
                    file = %file_info.file_name,
                    status = %status,
                    errors = validation.errors.len(),
                    warnings = validation.warnings.len(),
                    elapsed_ms,
                    "文件处理结束"
                );

                Ok(ImportOutcome {
                    batch_id: batch_id.to_string(),
                    data_source_id: source_id,
                    file_name: file_info.file_name,
                    status,
                    validation,
                    summary,
                    warnings,
                    elapsed_ms,
                })
            }
            Err(e) => {
                error!(file = %file_info.file_name, error = %e, "文件导入失败");
                let message = e.to_string();
                if let Err(mark_err) =
                    self.data_sources
                        .update_status(source_id, ProcessingStatus::Failed, Some(&message))
                {
                    warn!(error = %mark_err, "数据源状态回写失败");
                }
                Err(e)
            }
        }
    }

    /// 结构化 + 校验 + 落库；校验不通过时第二项为 None
    fn process(
        &self,
        path: &Path,
        file_name: &str,
    ) -> ImportResult<(ValidationReport, Option<(SaveSummary, Vec<String>)>)> {
        let mappings = self.mappings.snapshot()?;
        self.process_with(path, file_name, mappings)
    }

    /// 结构化与组装共用同一份映射快照
    fn process_with(
        &self,
        path: &Path,
        file_name: &str,
        mappings: Arc<FieldMappingConfig>,
    ) -> ImportResult<(ValidationReport, Option<(SaveSummary, Vec<String>)>)> {
        let output = self.structure_with(path, Arc::clone(&mappings))?;

        let validation = Validator::new(self.validation_config.clone()).validate(&output);
        if !validation.is_valid {
            warn!(errors = ?validation.errors, "数据验证失败，未写入数据库");
            return Ok((validation, None));
        }

        let assembly = VehicleAssembler::new(&mappings, &self.validation_config)
            .with_source_file(file_name)
            .assemble(&output);

        let summary = self.vehicles.save_aggregates(&assembly.aggregates)?;
        Ok((validation, Some((summary, assembly.warnings))))
    }

    /// 读取并结构化文件（不落库）
    pub fn structure_file(&self, path: &Path) -> ImportResult<StructuredOutput> {
        self.structure_with(path, self.mappings.snapshot()?)
    }

    fn structure_with(
        &self,
        path: &Path,
        mappings: Arc<FieldMappingConfig>,
    ) -> ImportResult<StructuredOutput> {
        let mut source = RawGridLoader::open(path)?;
        let structurer = Structurer::new(HeaderDetector::new(self.header_config.clone()), mappings);
        Ok(structurer.structure(source.as_mut()))
    }

    /// 预览文件（前 3 个工作表，每表最多 max_rows 行）
    pub fn preview_file(&self, path: &Path, max_rows: usize) -> ImportResult<FilePreview> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let mut source = RawGridLoader::open(path)?;
        let structurer = Structurer::new(
            HeaderDetector::new(self.header_config.clone()),
            self.mappings.snapshot()?,
        );
        Ok(structurer.preview(source.as_mut(), max_rows))
    }

    /// 结构化 + 校验（不落库、不登记数据源）
    pub fn check_file(&self, path: &Path) -> ImportResult<ValidationReport> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let output = self.structure_file(path)?;
        Ok(Validator::new(self.validation_config.clone()).validate(&output))
    }
}

#[async_trait]
impl VehicleImporter for VehicleImporterImpl {
    async fn import_file(&self, path: PathBuf) -> ImportResult<ImportOutcome> {
        let batch_id = Uuid::new_v4().to_string();
        self.import_in_batch(path, batch_id).await
    }

    async fn import_files(&self, paths: Vec<PathBuf>) -> Vec<Result<ImportOutcome, String>> {
        use futures::future::join_all;

        let batch_id = Uuid::new_v4().to_string();
        info!(batch_id = %batch_id, count = paths.len(), "开始批量导入文件");

        let tasks = paths.into_iter().map(|path| {
            let batch_id = batch_id.clone();
            async move {
                let display = path.display().to_string();
                self.import_in_batch(path, batch_id)
                    .await
                    .map_err(|e| format!("文件 {} 导入失败: {}", display, e))
            }
        });

        let results = join_all(tasks).await;

        info!(
            total = results.len(),
            completed = results
                .iter()
                .filter(|r| matches!(r, Ok(o) if o.is_completed()))
                .count(),
            failed = results
                .iter()
                .filter(|r| !matches!(r, Ok(o) if o.is_completed()))
                .count(),
            "批量导入完成"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::repository::ensure_schema;
    use std::io::Write;
    use std::sync::Mutex;

    fn importer() -> (VehicleImporterImpl, Arc<VehicleRepository>, Arc<DataSourceRepository>) {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let vehicles = Arc::new(VehicleRepository::from_connection(conn.clone()));
        let sources = Arc::new(DataSourceRepository::from_connection(conn));
        let importer = VehicleImporterImpl::new(
            vehicles.clone(),
            sources.clone(),
            Arc::new(FieldMappingRegistry::default()),
        );
        (importer, vehicles, sources)
    }

    fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_import_valid_csv_persists_vehicle() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "车辆信息.csv",
            "VIN,品牌,车型,年份\nLVSHFAEM1EF123456,大众,帕萨特,2020\n",
        );
        let (importer, vehicles, _) = importer();

        let outcome = importer.import_file(path).await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.summary.unwrap().vehicles, 1);

        let profile = vehicles.find_by_vin("LVSHFAEM1EF123456").unwrap().unwrap();
        assert_eq!(profile.vehicle.model.as_deref(), Some("帕萨特"));
        assert_eq!(profile.vehicle.year, Some(2020));
    }

    #[tokio::test]
    async fn test_invalid_vin_marks_source_failed_without_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "车辆信息.csv",
            "VIN,品牌\nSHORTVIN,大众\n",
        );
        let (importer, vehicles, sources) = importer();

        let outcome = importer.import_file(path).await.unwrap();
        assert_eq!(outcome.status, ProcessingStatus::Failed);
        assert!(outcome.summary.is_none());
        assert_eq!(vehicles.count().unwrap(), 0);

        let source = sources.find_by_id(outcome.data_source_id).unwrap().unwrap();
        assert_eq!(source.status, ProcessingStatus::Failed);
        assert!(source.error_message.unwrap().contains("SHORTVIN"));
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let (importer, _, _) = importer();
        let result = importer
            .import_file(PathBuf::from("/definitely/not/here.xlsx"))
            .await;
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_import_files_keeps_order_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_csv(
            dir.path(),
            "车辆信息_a.csv",
            "VIN,品牌\nLVSHFAEM1EF000001,大众\n",
        );
        let missing = dir.path().join("absent.csv");
        let unsupported = write_csv(dir.path(), "notes.txt", "hello");

        let (importer, vehicles, _) = importer();
        let results = importer
            .import_files(vec![good, missing, unsupported])
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().is_completed());
        assert!(results[1].is_err());
        assert!(results[2].is_err());
        assert_eq!(vehicles.count().unwrap(), 1);
    }

    #[test]
    fn test_one_mapping_snapshot_drives_structuring_and_assembly() {
        use crate::config::CategoryMapping;

        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "整车清单.csv",
            "VIN,出品方,颜色\nLVSHFAEM1EF000001,大众,白色\n",
        );
        let (importer, vehicles, _) = importer();

        let mut custom = FieldMappingConfig::default();
        custom
            .set_category(
                "vehicle_info",
                CategoryMapping::new(["整车"], [("VIN", vec!["VIN"]), ("make", vec!["出品方"])]),
            )
            .unwrap();

        let (validation, saved) = importer
            .process_with(&path, "整车清单.csv", Arc::new(custom))
            .unwrap();
        assert!(validation.is_valid);
        let (summary, warnings) = saved.expect("应已落库");
        assert_eq!(summary.vehicles, 1);
        assert!(warnings.is_empty(), "{:?}", warnings);

        let profile = vehicles.find_by_vin("LVSHFAEM1EF000001").unwrap().unwrap();
        assert_eq!(profile.vehicle.make.as_deref(), Some("大众"));
        // 已映射的列不再作为动态参数保存
        let names: Vec<_> = profile.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["颜色"]);

        // 注册表本身未被修改，默认映射不认识该工作表
        let report = importer.check_file(&path).unwrap();
        assert_eq!(report.statistics.total_records, 0);
    }

    #[test]
    fn test_preview_and_check_do_not_touch_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "车辆信息.csv",
            "VIN,品牌\nLVSHFAEM1EF000001,大众\nLVSHFAEM1EF000002,奥迪\n",
        );
        let (importer, vehicles, sources) = importer();

        let preview = importer.preview_file(&path, 1).unwrap();
        let sheet = preview.sheets.get("车辆信息").unwrap();
        assert_eq!(sheet.columns, vec!["VIN", "品牌"]);
        assert_eq!(sheet.rows.len(), 1);

        let report = importer.check_file(&path).unwrap();
        assert!(report.is_valid);

        assert_eq!(vehicles.count().unwrap(), 0);
        assert!(sources.list_recent(10).unwrap().is_empty());
    }
}

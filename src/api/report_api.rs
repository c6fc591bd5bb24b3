// ==========================================
// 报告 API
// ==========================================
// 职责:
// - 模板管理（列表 / 校验 / 创建）
// - 按 VIN 生成单份报告、按 VIN 列表批量生成
// - 每次成功生成都登记一条 TestReport
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{TemplateConfig, TemplateRegistry};
use crate::domain::{
    BatchResult, NewTestReport, OutputKind, RenderOutcome, ResolvedFields, VehicleProfile,
};
use crate::i18n::t_with_args;
use crate::report::{
    write_skeleton_template, BatchRunner, RenderDispatch, ReportError, TemplateResolver,
};
use crate::repository::{TemplateRepository, TestReportRepository, VehicleRepository};
use chrono::Local;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 模板概要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub name: String,
    pub title: Option<String>,
    pub template_file: Option<String>,
    /// 占位符列表（按配置顺序）
    pub placeholders: Vec<String>,
}

impl From<&TemplateConfig> for TemplateSummary {
    fn from(template: &TemplateConfig) -> Self {
        Self {
            name: template.name.clone(),
            title: template.title.clone(),
            template_file: template.template_file.clone(),
            placeholders: template.fields.keys().cloned().collect(),
        }
    }
}

/// 模板校验结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// 输出类型及其可用性
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputKindInfo {
    pub kind: OutputKind,
    pub extension: String,
    pub available: bool,
}

/// 创建模板请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    /// 输出类型名（tabular / pdf / docx ...）
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    /// 占位符 → 点分路径
    pub fields: IndexMap<String, String>,
}

/// 单份报告生成结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateReportResponse {
    pub vin: String,
    pub template: String,
    pub outcome: RenderOutcome,
    /// 登记的 TestReport id（仅成功时）
    pub report_id: Option<i64>,
}

pub struct ReportApi {
    vehicles: Arc<VehicleRepository>,
    reports: Arc<TestReportRepository>,
    template_store: Arc<TemplateRepository>,
    resolver: Arc<TemplateResolver>,
    dispatch: Arc<RenderDispatch>,
}

impl ReportApi {
    pub fn new(
        vehicles: Arc<VehicleRepository>,
        reports: Arc<TestReportRepository>,
        template_store: Arc<TemplateRepository>,
        resolver: Arc<TemplateResolver>,
        dispatch: Arc<RenderDispatch>,
    ) -> Self {
        Self {
            vehicles,
            reports,
            template_store,
            resolver,
            dispatch,
        }
    }

    fn templates(&self) -> &TemplateRegistry {
        self.resolver.templates()
    }

    // ==========================================
    // 模板管理
    // ==========================================

    pub fn list_templates(&self) -> ApiResult<Vec<TemplateSummary>> {
        Ok(self
            .templates()
            .snapshot()?
            .values()
            .map(TemplateSummary::from)
            .collect())
    }

    pub fn get_template(&self, name: &str) -> ApiResult<TemplateConfig> {
        Ok(self.templates().get(name)?)
    }

    /// 校验模板
    ///
    /// - 模板未注册 → error
    /// - 配置了模板文件但文件不存在 → warning（flow-document 回退为无模板排版）
    /// - 没有任何占位符 → warning
    pub fn validate_template(&self, name: &str) -> TemplateValidation {
        let mut result = TemplateValidation::default();

        let template = match self.templates().get(name) {
            Ok(t) => t,
            Err(_) => {
                result
                    .errors
                    .push(t_with_args("template.not_found", &[("name", name)]));
                return result;
            }
        };

        if let Some(file) = &template.template_file {
            let path = self.dispatch.template_dir().join(file);
            if !path.exists() {
                let shown = path.display().to_string();
                result
                    .warnings
                    .push(t_with_args("template.file_missing", &[("path", &shown)]));
            }
        }
        if template.fields.is_empty() {
            result
                .warnings
                .push(t_with_args("template.no_fields", &[("name", name)]));
        }

        result.is_valid = result.errors.is_empty();
        result
    }

    /// 创建模板：校验 → flow-document 写出骨架模板文件 → 持久化 → 发布到注册表
    ///
    /// 持久化失败时注册表保持不变
    #[instrument(skip(self, request), fields(name = %request.name, kind = %request.kind))]
    pub fn create_template(&self, request: CreateTemplateRequest) -> ApiResult<TemplateSummary> {
        let kind = OutputKind::parse(&request.kind)
            .ok_or_else(|| ApiError::UnsupportedFormat(request.kind.clone()))?;

        let name = request.name.trim().to_string();
        let mut template = TemplateConfig::new(&name);
        template.title = request.title.filter(|t| !t.trim().is_empty());
        template.fields = request.fields;
        if kind == OutputKind::FlowDocument {
            template.template_file = Some(format!("{}_template.{}", name, kind.extension()));
        }
        // 名称参与骨架文件路径拼接，需先于任何写盘完成校验
        template
            .validate()
            .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

        if let Some(file) = &template.template_file {
            let path = self.dispatch.template_dir().join(file);
            match write_skeleton_template(&path, &template) {
                Ok(()) => info!(path = %path.display(), "骨架模板文件已生成"),
                Err(ReportError::RenderUnavailable(kind)) => {
                    warn!(kind = %kind, "渲染能力不可用，跳过骨架模板文件")
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.template_store.upsert(&template, kind.as_str())?;
        self.templates().register(template.clone())?;
        Ok(TemplateSummary::from(&template))
    }

    // ==========================================
    // 输出能力
    // ==========================================

    pub fn output_kinds(&self) -> Vec<OutputKindInfo> {
        OutputKind::ALL
            .into_iter()
            .map(|kind| OutputKindInfo {
                kind,
                extension: kind.extension().to_string(),
                available: self.dispatch.is_supported(kind),
            })
            .collect()
    }

    // ==========================================
    // 报告生成
    // ==========================================

    /// 按 VIN 生成单份报告
    ///
    /// # 返回
    /// - Ok: 渲染结果（能力缺失 / 渲染失败同样是 Ok，见 outcome）
    /// - Err: VIN 不存在 / 模板不存在 / 输出类型未知
    #[instrument(skip(self, destination))]
    pub fn generate_report<P: AsRef<Path>>(
        &self,
        vin: &str,
        template_name: &str,
        kind_name: &str,
        destination: P,
    ) -> ApiResult<GenerateReportResponse> {
        let kind = OutputKind::parse(kind_name)
            .ok_or_else(|| ApiError::UnsupportedFormat(kind_name.to_string()))?;
        let template = self.templates().get(template_name)?;
        let profile = self.load_profile(vin)?;

        let fields = self
            .resolver
            .resolve_at(&profile.to_field_map(), &template, Local::now().naive_local());
        let outcome = self
            .dispatch
            .render_kind(&fields, &template, kind, destination.as_ref());

        let report_id = match &outcome {
            RenderOutcome::Rendered { path } => {
                Some(self.record_report(&profile, template_name, &fields, path)?)
            }
            _ => None,
        };

        Ok(GenerateReportResponse {
            vin: profile.vehicle.vin,
            template: template_name.to_string(),
            outcome,
            report_id,
        })
    }

    /// 批量生成
    ///
    /// `vins` 为 None 时对全部车辆生成；列表中存在未知 VIN 时整批拒绝
    #[instrument(skip(self, vins, output_dir))]
    pub fn generate_batch<P: AsRef<Path>>(
        &self,
        vins: Option<&[String]>,
        template_name: &str,
        kind_name: &str,
        output_dir: P,
    ) -> ApiResult<BatchResult> {
        let profiles = match vins {
            Some(vins) => self.load_profiles(vins)?,
            None => self.all_profiles()?,
        };
        if profiles.is_empty() {
            return Err(ApiError::InvalidInput("没有可生成报告的车辆".to_string()));
        }

        let records: Vec<_> = profiles.iter().map(VehicleProfile::to_field_map).collect();
        let runner = BatchRunner::new(Arc::clone(&self.resolver), Arc::clone(&self.dispatch));

        // 登记的测试数据即渲染时使用的字段
        let result = runner.run_batch_with(
            &records,
            template_name,
            output_dir.as_ref(),
            kind_name,
            |index, path, fields| {
                let profile = &profiles[index - 1];
                if let Err(e) = self.record_report(profile, template_name, fields, path) {
                    warn!(index, vin = %profile.vehicle.vin, error = %e, "报告登记失败");
                }
            },
        )?;
        Ok(result)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn load_profile(&self, vin: &str) -> ApiResult<VehicleProfile> {
        let vin = vin.trim();
        if vin.is_empty() {
            return Err(ApiError::InvalidInput("VIN不能为空".to_string()));
        }
        self.vehicles
            .find_by_vin(vin)?
            .ok_or_else(|| ApiError::NotFound(format!("VIN {} 对应的车辆不存在", vin)))
    }

    fn load_profiles(&self, vins: &[String]) -> ApiResult<Vec<VehicleProfile>> {
        let mut profiles = Vec::with_capacity(vins.len());
        let mut missing = Vec::new();
        for vin in vins {
            match self.vehicles.find_by_vin(vin.trim())? {
                Some(p) => profiles.push(p),
                None => missing.push(vin.trim().to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(ApiError::NotFound(format!(
                "以下 VIN 对应的车辆不存在: {}",
                missing.join(", ")
            )));
        }
        Ok(profiles)
    }

    fn all_profiles(&self) -> ApiResult<Vec<VehicleProfile>> {
        let mut profiles = Vec::new();
        for vehicle in self.vehicles.list_all()? {
            if let Some(p) = self.vehicles.find_by_vin(&vehicle.vin)? {
                profiles.push(p);
            }
        }
        Ok(profiles)
    }

    fn record_report(
        &self,
        profile: &VehicleProfile,
        template_name: &str,
        fields: &ResolvedFields,
        path: &Path,
    ) -> ApiResult<i64> {
        let report = NewTestReport {
            vehicle_id: profile.vehicle.id,
            report_type: template_name.to_string(),
            test_date: Local::now().naive_local(),
            test_result: None,
            test_data: Some(serde_json::to_value(fields).map_err(anyhow::Error::from)?),
            report_file: Some(PathBuf::from(path).display().to_string()),
            operator: None,
        };
        Ok(self.reports.insert(&report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::domain::{EmissionDraft, VehicleAggregate, VehicleDraft};
    use crate::report::dispatch::tests::TextRenderer;
    use crate::repository::ensure_schema;
    use std::sync::Mutex;

    struct Fixture {
        api: ReportApi,
        reports: Arc<TestReportRepository>,
        vehicles: Arc<VehicleRepository>,
        _dir: tempfile::TempDir,
        template_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let template_dir = dir.path().join("templates");
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let vehicles = Arc::new(VehicleRepository::from_connection(conn.clone()));
        let reports = Arc::new(TestReportRepository::from_connection(conn.clone()));
        let store = Arc::new(TemplateRepository::from_connection(conn));

        for vin in ["LVSHFAEM1EF000001", "LVSHFAEM1EF000002"] {
            vehicles
                .save_aggregates(&[VehicleAggregate {
                    vehicle: VehicleDraft {
                        vin: vin.to_string(),
                        make: Some("大众".to_string()),
                        ..Default::default()
                    },
                    emission: Some(EmissionDraft {
                        emission_standard: "国VI".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }])
                .unwrap();
        }

        let mut dispatch = RenderDispatch::empty(&template_dir);
        dispatch.register(Box::new(TextRenderer::new(OutputKind::Tabular)));
        let resolver = Arc::new(TemplateResolver::with_date_format(
            Arc::new(TemplateRegistry::default()),
            "%Y-%m-%d",
        ));
        let api = ReportApi::new(
            vehicles.clone(),
            reports.clone(),
            store,
            resolver,
            Arc::new(dispatch),
        );
        Fixture {
            api,
            reports,
            vehicles,
            _dir: dir,
            template_dir,
        }
    }

    fn vehicle_id(f: &Fixture, vin: &str) -> i64 {
        f.vehicles.find_by_vin(vin).unwrap().unwrap().vehicle.id
    }

    #[test]
    fn test_generate_report_records_test_report() {
        let f = fixture();
        let dest = f.template_dir.join("out").join("r.xlsx");
        let resp = f
            .api
            .generate_report("LVSHFAEM1EF000001", "vehicle_emission_report", "xlsx", &dest)
            .unwrap();
        assert!(resp.outcome.is_success());
        assert!(resp.report_id.is_some());

        let rows = f
            .reports
            .list_by_vehicle(vehicle_id(&f, "LVSHFAEM1EF000001"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].report_type, "vehicle_emission_report");
        let data = rows[0].test_data.as_ref().unwrap();
        assert_eq!(data["[排放标准]"], "国VI");
    }

    #[test]
    fn test_unavailable_kind_is_not_recorded() {
        let f = fixture();
        let dest = f.template_dir.join("r.pdf");
        let resp = f
            .api
            .generate_report("LVSHFAEM1EF000001", "vehicle_basic_info", "pdf", &dest)
            .unwrap();
        assert!(matches!(resp.outcome, RenderOutcome::Unavailable { .. }));
        assert!(resp.report_id.is_none());
    }

    #[test]
    fn test_generate_report_caller_errors() {
        let f = fixture();
        let dest = f.template_dir.join("r.xlsx");
        assert!(matches!(
            f.api.generate_report("LVSHFAEM1EF000001", "vehicle_basic_info", "html", &dest),
            Err(ApiError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            f.api.generate_report("LVSHFAEM1EF000001", "missing", "xlsx", &dest),
            Err(ApiError::TemplateNotFound(_))
        ));
        assert!(matches!(
            f.api.generate_report("LVSHFAEM1EF999999", "vehicle_basic_info", "xlsx", &dest),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_batch_over_all_vehicles() {
        let f = fixture();
        let out = f.template_dir.join("batch");
        let result = f
            .api
            .generate_batch(None, "vehicle_basic_info", "xlsx", &out)
            .unwrap();
        assert_eq!(result.success_count, 2);
        assert_eq!(
            f.reports
                .list_by_vehicle(vehicle_id(&f, "LVSHFAEM1EF000002"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_batch_rejects_unknown_vin() {
        let f = fixture();
        let vins = vec!["LVSHFAEM1EF000001".to_string(), "NOPE".to_string()];
        assert!(matches!(
            f.api.generate_batch(Some(vins.as_slice()), "vehicle_basic_info", "xlsx", &f.template_dir),
            Err(ApiError::NotFound(msg)) if msg.contains("NOPE")
        ));
    }

    #[test]
    fn test_validate_template() {
        let f = fixture();
        let missing = f.api.validate_template("nope");
        assert!(!missing.is_valid);
        assert_eq!(missing.errors.len(), 1);

        // 内置模板的文档模板文件尚未放入模板目录
        let builtin = f.api.validate_template("vehicle_basic_info");
        assert!(builtin.is_valid);
        assert_eq!(builtin.warnings.len(), 1);
    }

    #[cfg(feature = "docx")]
    #[test]
    fn test_create_flow_template_writes_skeleton_and_persists() {
        let f = fixture();
        let mut fields = IndexMap::new();
        fields.insert("[VIN码]".to_string(), "vin".to_string());
        fields.insert("[排量]".to_string(), "engine.displacement".to_string());

        let summary = f
            .api
            .create_template(CreateTemplateRequest {
                name: "engine_sheet".to_string(),
                kind: "docx".to_string(),
                title: None,
                fields,
            })
            .unwrap();
        assert_eq!(summary.template_file.as_deref(), Some("engine_sheet_template.docx"));
        assert!(f.template_dir.join("engine_sheet_template.docx").exists());

        let check = f.api.validate_template("engine_sheet");
        assert!(check.is_valid);
        assert!(check.warnings.is_empty());
        assert!(f.api.template_store.find_by_name("engine_sheet").unwrap().is_some());
    }

    #[test]
    fn test_create_template_rejects_path_like_names() {
        let f = fixture();
        for name in ["../escape", "nested/name", "..\\up", ""] {
            let err = f
                .api
                .create_template(CreateTemplateRequest {
                    name: name.to_string(),
                    kind: "docx".to_string(),
                    title: None,
                    fields: IndexMap::new(),
                })
                .unwrap_err();
            assert!(matches!(err, ApiError::InvalidInput(_)), "{}: {:?}", name, err);
        }

        // 模板目录之外没有写出任何文件，也没有登记或持久化
        let parent = f.template_dir.parent().unwrap();
        assert!(!parent.join("escape_template.docx").exists());
        assert!(!f.template_dir.join("nested").exists());
        assert!(!f.api.templates().contains("../escape"));
        assert!(f.api.template_store.find_by_name("../escape").unwrap().is_none());
    }

    #[test]
    fn test_batch_records_the_fields_that_were_rendered() {
        let f = fixture();
        let out = f.template_dir.join("batch");
        let vins = vec!["LVSHFAEM1EF000001".to_string()];
        let result = f
            .api
            .generate_batch(Some(vins.as_slice()), "vehicle_basic_info", "xlsx", &out)
            .unwrap();
        assert_eq!(result.success_count, 1);

        let rows = f
            .reports
            .list_by_vehicle(vehicle_id(&f, "LVSHFAEM1EF000001"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        let written = std::fs::read_to_string(&result.output_paths[0]).unwrap();
        let data = rows[0].test_data.as_ref().unwrap().as_object().unwrap();
        // 登记的每个字段（含生成时间）都与文件内容一致
        for (key, value) in data {
            let line = format!("{}={}", key, value.as_str().unwrap());
            assert!(written.lines().any(|l| l == line), "{}", line);
        }
        assert!(data.contains_key("[生成时间]"));
    }

    #[test]
    fn test_create_template_without_fields_warns() {
        let f = fixture();
        f.api
            .create_template(CreateTemplateRequest {
                name: "blank".to_string(),
                kind: "xlsx".to_string(),
                title: Some("空白".to_string()),
                fields: IndexMap::new(),
            })
            .unwrap();
        let check = f.api.validate_template("blank");
        assert!(check.is_valid);
        assert_eq!(check.warnings.len(), 1);
    }
}

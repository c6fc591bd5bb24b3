// ==========================================
// 汽车数据处理工具 - 模板解析器
// ==========================================
// 职责: 按模板的 占位符 → 点分路径 从记录中取值并格式化
// 约束:
// - 路径不存在或中途遇到标量 → 空串（从不报错，从不保留占位符）
// - [生成日期] / [生成时间] 总是追加在最后，取解析时刻
// ==========================================

use crate::config::{ConfigResult, TemplateConfig, TemplateRegistry, PATH_SEPARATOR};
use crate::domain::{
    CellValue, FieldMap, FieldValue, ResolvedFields, GENERATED_DATE_PLACEHOLDER,
    GENERATED_TIME_PLACEHOLDER,
};
use crate::i18n::t;
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use tracing::debug;

/// 生成时间格式
pub const TIME_FORMAT: &str = "%H:%M:%S";

pub struct TemplateResolver {
    templates: Arc<TemplateRegistry>,
    date_format: String,
}

impl TemplateResolver {
    /// 日期格式取当前语言的本地化格式
    pub fn new(templates: Arc<TemplateRegistry>) -> Self {
        Self::with_date_format(templates, &t("format.date"))
    }

    pub fn with_date_format(templates: Arc<TemplateRegistry>, date_format: &str) -> Self {
        Self {
            templates,
            date_format: date_format.to_string(),
        }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// 按模板名解析（模板不存在 → TemplateNotFound）
    pub fn resolve(&self, record: &FieldMap, template_name: &str) -> ConfigResult<ResolvedFields> {
        let template = self.templates.get(template_name)?;
        Ok(self.resolve_at(record, &template, Local::now().naive_local()))
    }

    /// 以指定时刻解析（生成日期/时间取该时刻）
    pub fn resolve_at(
        &self,
        record: &FieldMap,
        template: &TemplateConfig,
        now: NaiveDateTime,
    ) -> ResolvedFields {
        let mut resolved = ResolvedFields::with_capacity(template.fields.len() + 2);
        for (placeholder, path) in &template.fields {
            let text = lookup_path(record, path)
                .map(|v| self.format_value(v))
                .unwrap_or_default();
            resolved.insert(placeholder.clone(), text);
        }

        // 元数据（即便模板里有同名占位符也以解析时刻为准，并移到最后）
        resolved.shift_remove(GENERATED_DATE_PLACEHOLDER);
        resolved.shift_remove(GENERATED_TIME_PLACEHOLDER);
        resolved.insert(
            GENERATED_DATE_PLACEHOLDER.to_string(),
            now.format(&self.date_format).to_string(),
        );
        resolved.insert(
            GENERATED_TIME_PLACEHOLDER.to_string(),
            now.format(TIME_FORMAT).to_string(),
        );

        debug!(template = %template.name, fields = resolved.len(), "模板解析完成");
        resolved
    }

    /// 按值类型格式化
    pub fn format_value(&self, value: &CellValue) -> String {
        match value {
            CellValue::Date(d) => d.format(&self.date_format).to_string(),
            CellValue::DateTime(dt) => dt.format(&self.date_format).to_string(),
            other => other.to_string(),
        }
    }
}

/// 沿点分路径取值（缺失返回 None）
pub fn lookup_path<'a>(record: &'a FieldMap, path: &str) -> Option<&'a CellValue> {
    let mut segments = path.split(PATH_SEPARATOR);
    let first = segments.next()?;
    let mut current = record.get(first)?;
    for segment in segments {
        current = current.as_map()?.get(segment)?;
    }
    match current {
        FieldValue::Scalar(v) if v.is_empty() => None,
        FieldValue::Scalar(v) => Some(v),
        FieldValue::Map(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn resolver() -> TemplateResolver {
        TemplateResolver::with_date_format(Arc::new(TemplateRegistry::default()), "%Y年%m月%d日")
    }

    fn record() -> FieldMap {
        let mut engine = FieldMap::new();
        engine.insert("engine_code".to_string(), FieldValue::Scalar("EA888".into()));
        engine.insert("displacement".to_string(), FieldValue::Scalar(CellValue::Float(2.0)));

        let mut record = FieldMap::new();
        record.insert("vin".to_string(), FieldValue::Scalar("LVSHFAEM1EF123456".into()));
        record.insert("year".to_string(), FieldValue::Scalar(CellValue::Int(2020)));
        record.insert(
            "production_date".to_string(),
            FieldValue::Scalar(CellValue::Date(NaiveDate::from_ymd_opt(2020, 3, 15).unwrap())),
        );
        record.insert("engine".to_string(), FieldValue::Map(engine));
        record
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 30, 5)
            .unwrap()
    }

    #[test]
    fn test_missing_nested_path_is_empty() {
        let template = TemplateConfig::new("t")
            .with_field("[扭矩]", "engine.torque")
            .with_field("[变速箱]", "transmission.transmission_code")
            .with_field("[穿透标量]", "vin.length");
        let resolved = resolver().resolve_at(&record(), &template, now());
        assert_eq!(resolved["[扭矩]"], "");
        assert_eq!(resolved["[变速箱]"], "");
        assert_eq!(resolved["[穿透标量]"], "");
    }

    #[test]
    fn test_formats_by_value_kind() {
        let template = TemplateConfig::new("t")
            .with_field("[排量]", "engine.displacement")
            .with_field("[年份]", "year")
            .with_field("[生产日期]", "production_date");
        let resolved = resolver().resolve_at(&record(), &template, now());
        assert_eq!(resolved["[排量]"], "2.0");
        assert_eq!(resolved["[年份]"], "2020");
        assert_eq!(resolved["[生产日期]"], "2020年03月15日");
    }

    #[test]
    fn test_generation_metadata_appended_last() {
        let template = TemplateConfig::new("t")
            .with_field("[生成日期]", "vin")
            .with_field("[VIN码]", "vin");
        let resolved = resolver().resolve_at(&record(), &template, now());
        let keys: Vec<_> = resolved.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["[VIN码]", "[生成日期]", "[生成时间]"]);
        assert_eq!(resolved["[生成日期]"], "2024年05月01日");
        assert_eq!(resolved["[生成时间]"], "09:30:05");
    }

    #[test]
    fn test_unknown_template_errors() {
        assert!(resolver().resolve(&record(), "missing").is_err());
        let resolved = resolver().resolve(&record(), "vehicle_basic_info").unwrap();
        assert_eq!(resolved["[发动机型号]"], "EA888");
        assert_eq!(resolved["[车型]"], "");
    }
}

// ==========================================
// 汽车数据处理工具 - 车辆聚合组装器
// ==========================================
// 职责: 标准化记录 → 按车辆识别码分组的写入草稿
// 规则:
//   - vehicle_info 记录以 VIN 建立车辆；其他类别按自身 VIN 关联
//   - 子记录无 VIN 时，仅当 vehicle_info 恰好建立一辆车才挂到该车，否则跳过并告警
//   - 子记录 VIN 长度不合法时跳过并告警（不据此新建车辆）
//   - 未被标准映射消费的源列作为动态参数保存
// ==========================================

use crate::config::{FieldMappingConfig, ValidationConfig};
use crate::domain::{
    CanonicalRecord, CellValue, EmissionDraft, EngineDraft, NewParameter, StructuredOutput,
    TransmissionDraft, VehicleAggregate, VehicleDraft,
};
use chrono::{Datelike, NaiveDate};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const VEHICLE_INFO: &str = "vehicle_info";
const ENGINE_INFO: &str = "engine_info";
const EMISSION_INFO: &str = "emission_info";
const TRANSMISSION_INFO: &str = "transmission_info";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Assembly {
    pub aggregates: Vec<VehicleAggregate>,
    pub warnings: Vec<String>,
}

pub struct VehicleAssembler<'a> {
    mappings: &'a FieldMappingConfig,
    identifier_field: &'a str,
    identifier_length: usize,
    source_file: Option<String>,
}

impl<'a> VehicleAssembler<'a> {
    /// # 参数
    /// - mappings: 本次结构化使用的映射快照
    /// - validation: 车辆识别码字段名与合法长度
    pub fn new(mappings: &'a FieldMappingConfig, validation: &'a ValidationConfig) -> Self {
        Self {
            mappings,
            identifier_field: &validation.identifier_field,
            identifier_length: validation.identifier_length,
            source_file: None,
        }
    }

    pub fn with_source_file(mut self, file_name: &str) -> Self {
        self.source_file = Some(file_name.to_string());
        self
    }

    pub fn assemble(&self, output: &StructuredOutput) -> Assembly {
        let mut by_vin: IndexMap<String, VehicleAggregate> = IndexMap::new();
        let mut warnings = Vec::new();

        // 第一遍：建立车辆
        for record in output.records_of(VEHICLE_INFO) {
            let Some(vin) = self.vin_of(record) else {
                warnings.push(format!(
                    "工作表 {} 第 {} 行缺少车辆识别码，已跳过",
                    record.sheet,
                    record.row_index + 1
                ));
                continue;
            };

            let aggregate = by_vin.entry(vin.clone()).or_insert_with(|| VehicleAggregate {
                vehicle: VehicleDraft {
                    vin: vin.clone(),
                    ..Default::default()
                },
                ..Default::default()
            });
            fill_vehicle(&mut aggregate.vehicle, record, &mut warnings);
            let params = self.leftover_parameters(output, record);
            aggregate.vehicle_parameters.extend(params);
        }

        // 无 VIN 子记录的兜底归属只看第一遍的结果
        let single_vin = match by_vin.len() {
            1 => by_vin.keys().next().cloned(),
            _ => None,
        };

        // 第二遍：关联子记录
        for (category, records) in &output.categorized {
            if category == VEHICLE_INFO {
                continue;
            }
            for record in records {
                let vin = match (self.vin_of(record), &single_vin) {
                    (Some(vin), _) if vin.chars().count() != self.identifier_length => {
                        warnings.push(format!(
                            "工作表 {} 第 {} 行车辆识别码 {} 长度不合法，已跳过",
                            record.sheet,
                            record.row_index + 1,
                            vin
                        ));
                        continue;
                    }
                    (Some(vin), _) => vin,
                    (None, Some(only)) => only.clone(),
                    (None, None) => {
                        warnings.push(format!(
                            "工作表 {} 第 {} 行无法关联到车辆（缺少车辆识别码），已跳过",
                            record.sheet,
                            record.row_index + 1
                        ));
                        continue;
                    }
                };

                let aggregate = by_vin.entry(vin.clone()).or_insert_with(|| VehicleAggregate {
                    vehicle: VehicleDraft {
                        vin: vin.clone(),
                        ..Default::default()
                    },
                    ..Default::default()
                });
                self.attach(aggregate, category, record, output, &mut warnings);
            }
        }

        for w in &warnings {
            warn!(warning = %w, "组装告警");
        }
        debug!(vehicles = by_vin.len(), "车辆聚合组装完成");

        Assembly {
            aggregates: by_vin.into_values().collect(),
            warnings,
        }
    }

    fn vin_of(&self, record: &CanonicalRecord) -> Option<String> {
        record
            .get(self.identifier_field)
            .map(|v| v.to_string().trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn attach(
        &self,
        aggregate: &mut VehicleAggregate,
        category: &str,
        record: &CanonicalRecord,
        output: &StructuredOutput,
        warnings: &mut Vec<String>,
    ) {
        let params = self.leftover_parameters(output, record);
        match category {
            ENGINE_INFO => {
                let Some(code) = text_field(record, "engine_code") else {
                    warnings.push(missing_key_warning(record, "engine_code"));
                    return;
                };
                if aggregate.engine.is_some() {
                    warnings.push(duplicate_warning(record, &aggregate.vehicle.vin));
                    return;
                }
                aggregate.engine = Some(EngineDraft {
                    engine_code: code,
                    displacement: float_field(record, "displacement", warnings),
                    power: float_field(record, "power", warnings),
                    torque: float_field(record, "torque", warnings),
                    fuel_type: text_field(record, "fuel_type"),
                    aspiration: text_field(record, "aspiration"),
                    cylinder_count: int_field(record, "cylinder_count", warnings),
                    configuration: text_field(record, "configuration"),
                });
                aggregate.engine_parameters.extend(params);
            }
            TRANSMISSION_INFO => {
                let Some(code) = text_field(record, "transmission_code") else {
                    warnings.push(missing_key_warning(record, "transmission_code"));
                    return;
                };
                if aggregate.transmission.is_some() {
                    warnings.push(duplicate_warning(record, &aggregate.vehicle.vin));
                    return;
                }
                aggregate.transmission = Some(TransmissionDraft {
                    transmission_code: code,
                    transmission_type: text_field(record, "transmission_type"),
                    gear_count: int_field(record, "gear_count", warnings),
                    drive_type: text_field(record, "drive_type"),
                });
                aggregate.transmission_parameters.extend(params);
            }
            EMISSION_INFO => {
                let Some(standard) = text_field(record, "emission_standard") else {
                    warnings.push(missing_key_warning(record, "emission_standard"));
                    return;
                };
                if aggregate.emission.is_some() {
                    warnings.push(duplicate_warning(record, &aggregate.vehicle.vin));
                    return;
                }
                aggregate.emission = Some(EmissionDraft {
                    emission_standard: standard,
                    co2_emission: float_field(record, "co2_emission", warnings),
                    fuel_consumption: float_field(record, "fuel_consumption", warnings),
                    test_method: text_field(record, "test_method"),
                    test_date: date_field(record, "test_date", warnings),
                });
                aggregate.vehicle_parameters.extend(params);
            }
            _ => {
                // 自定义类别：标准字段整体作为车辆参数
                for (field, value) in &record.fields {
                    if field == self.identifier_field {
                        continue;
                    }
                    aggregate
                        .vehicle_parameters
                        .push(self.parameter(field, value, category));
                }
                aggregate.vehicle_parameters.extend(params);
            }
        }
    }

    /// 未被标准映射消费的非空源列
    fn leftover_parameters(
        &self,
        output: &StructuredOutput,
        record: &CanonicalRecord,
    ) -> Vec<NewParameter> {
        let Some(raw) = output.raw_record_of(record) else {
            return Vec::new();
        };
        let consumed: IndexSet<&str> = match self.mappings.category(&record.category) {
            Ok(mapping) => mapping.all_aliases().collect(),
            Err(_) => IndexSet::new(),
        };

        raw.iter()
            .filter(|(label, value)| !consumed.contains(label.as_str()) && !value.is_empty())
            .map(|(label, value)| self.parameter(label, value, &record.category))
            .collect()
    }

    fn parameter(&self, label: &str, value: &CellValue, category: &str) -> NewParameter {
        let (name, unit) = split_unit(label);
        NewParameter {
            name,
            value: Some(value.to_string()),
            unit,
            category: Some(category.to_string()),
            source_file: self.source_file.clone(),
        }
    }
}

fn fill_vehicle(vehicle: &mut VehicleDraft, record: &CanonicalRecord, warnings: &mut Vec<String>) {
    if vehicle.make.is_none() {
        vehicle.make = text_field(record, "make");
    }
    if vehicle.model.is_none() {
        vehicle.model = text_field(record, "model");
    }
    if vehicle.year.is_none() {
        vehicle.year = year_field(record, "year", warnings);
    }
    if vehicle.production_date.is_none() {
        vehicle.production_date = date_field(record, "production_date", warnings);
    }
}

fn missing_key_warning(record: &CanonicalRecord, field: &str) -> String {
    format!(
        "工作表 {} 第 {} 行缺少关键字段 {}，已跳过",
        record.sheet,
        record.row_index + 1,
        field
    )
}

fn duplicate_warning(record: &CanonicalRecord, vin: &str) -> String {
    format!(
        "工作表 {} 第 {} 行：车辆 {} 已有 {} 记录，保留先出现的一条",
        record.sheet,
        record.row_index + 1,
        vin,
        record.category
    )
}

fn conversion_warning(record: &CanonicalRecord, field: &str, value: &CellValue) -> String {
    format!(
        "工作表 {} 第 {} 行字段 {} 的值 '{}' 无法转换，已忽略",
        record.sheet,
        record.row_index + 1,
        field,
        value
    )
}

/// "扭矩(N·m)" → ("扭矩", Some("N·m"))
pub fn split_unit(label: &str) -> (String, Option<String>) {
    let trimmed = label.trim();
    for (open, close) in [('(', ')'), ('（', '）')] {
        if let (Some(start), true) = (trimmed.rfind(open), trimmed.ends_with(close)) {
            let name = trimmed[..start].trim();
            let unit = trimmed[start + open.len_utf8()..trimmed.len() - close.len_utf8()].trim();
            if !name.is_empty() && !unit.is_empty() {
                return (name.to_string(), Some(unit.to_string()));
            }
        }
    }
    (trimmed.to_string(), None)
}

// ==========================================
// 类型转换
// ==========================================

fn text_field(record: &CanonicalRecord, field: &str) -> Option<String> {
    record
        .get(field)
        .map(|v| v.to_string().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn float_field(record: &CanonicalRecord, field: &str, warnings: &mut Vec<String>) -> Option<f64> {
    let value = record.get(field)?;
    let parsed = value.as_f64().or_else(|| leading_number(value));
    if parsed.is_none() {
        warnings.push(conversion_warning(record, field, value));
    }
    parsed
}

fn int_field(record: &CanonicalRecord, field: &str, warnings: &mut Vec<String>) -> Option<i32> {
    let value = record.get(field)?;
    let parsed = value
        .as_f64()
        .or_else(|| leading_number(value))
        .filter(|f| f.fract() == 0.0 && *f >= f64::from(i32::MIN) && *f <= f64::from(i32::MAX))
        .map(|f| f as i32);
    if parsed.is_none() {
        warnings.push(conversion_warning(record, field, value));
    }
    parsed
}

fn year_field(record: &CanonicalRecord, field: &str, warnings: &mut Vec<String>) -> Option<i32> {
    match record.get(field)? {
        CellValue::Date(d) => Some(d.year()),
        CellValue::DateTime(dt) => Some(dt.year()),
        _ => int_field(record, field, warnings),
    }
}

fn date_field(
    record: &CanonicalRecord,
    field: &str,
    warnings: &mut Vec<String>,
) -> Option<NaiveDate> {
    let value = record.get(field)?;
    let parsed = match value {
        CellValue::Date(d) => Some(*d),
        CellValue::DateTime(dt) => Some(dt.date()),
        CellValue::Text(s) => parse_date_text(s),
        _ => None,
    };
    if parsed.is_none() {
        warnings.push(conversion_warning(record, field, value));
    }
    parsed
}

fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d", "%Y年%m月%d日"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// "150kW" → 150.0
fn leading_number(value: &CellValue) -> Option<f64> {
    let text = value.as_str()?.trim();
    let end = text
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == '-'))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text[..end].parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderDetectionConfig;
    use crate::domain::Grid;
    use crate::importer::{HeaderDetector, MemoryWorkbook, Structurer};
    use std::sync::Arc;

    fn structure(source: &mut MemoryWorkbook) -> StructuredOutput {
        Structurer::new(
            HeaderDetector::new(HeaderDetectionConfig::default()),
            Arc::new(FieldMappingConfig::default()),
        )
        .structure(source)
    }

    #[test]
    fn test_groups_sub_records_by_vin() {
        let mut source = MemoryWorkbook::new()
            .with_sheet(
                "车辆信息",
                Grid::from_text_rows(&[
                    vec!["VIN码", "品牌", "年份", "颜色"],
                    vec!["LVSHFAEM1EF123456", "大众", "2020", "白"],
                    vec!["LVSHFAEM1EF654321", "丰田", "2021", ""],
                ]),
            )
            .with_sheet(
                "发动机信息",
                Grid::from_text_rows(&[
                    vec!["VIN", "发动机型号", "排量", "缸径(mm)"],
                    vec!["LVSHFAEM1EF654321", "2ZR", "1.8", "80.5"],
                ]),
            );

        let output = structure(&mut source);
        let mappings = FieldMappingConfig::default();
        let validation = ValidationConfig::default();
        let assembly = VehicleAssembler::new(&mappings, &validation)
            .with_source_file("a.xlsx")
            .assemble(&output);

        assert_eq!(assembly.aggregates.len(), 2);
        let first = &assembly.aggregates[0];
        assert_eq!(first.vehicle.year, Some(2020));
        assert!(first.engine.is_none());
        assert_eq!(first.vehicle_parameters.len(), 1);
        assert_eq!(first.vehicle_parameters[0].name, "颜色");

        let second = &assembly.aggregates[1];
        let engine = second.engine.as_ref().unwrap();
        assert_eq!(engine.engine_code, "2ZR");
        assert_eq!(engine.displacement, Some(1.8));
        assert_eq!(second.engine_parameters[0].name, "缸径");
        assert_eq!(second.engine_parameters[0].unit.as_deref(), Some("mm"));
        assert_eq!(
            second.engine_parameters[0].source_file.as_deref(),
            Some("a.xlsx")
        );
    }

    #[test]
    fn test_sub_record_without_vin_attaches_to_single_vehicle() {
        let mut source = MemoryWorkbook::new()
            .with_sheet(
                "基本信息",
                Grid::from_text_rows(&[vec!["VIN码", "品牌"], vec!["LVSHFAEM1EF123456", "大众"]]),
            )
            .with_sheet(
                "排放信息",
                Grid::from_text_rows(&[vec!["排放标准", "油耗"], vec!["国六", "6.5"]]),
            );

        let output = structure(&mut source);
        let mappings = FieldMappingConfig::default();
        let validation = ValidationConfig::default();
        let assembly = VehicleAssembler::new(&mappings, &validation).assemble(&output);

        assert_eq!(assembly.aggregates.len(), 1);
        let emission = assembly.aggregates[0].emission.as_ref().unwrap();
        assert_eq!(emission.emission_standard, "国六");
        assert_eq!(emission.fuel_consumption, Some(6.5));
        assert!(assembly.warnings.is_empty());
    }

    #[test]
    fn test_sub_record_without_vin_skipped_when_ambiguous() {
        let mut source = MemoryWorkbook::new()
            .with_sheet(
                "车辆信息",
                Grid::from_text_rows(&[
                    vec!["VIN码", "品牌"],
                    vec!["LVSHFAEM1EF123456", "大众"],
                    vec!["LVSHFAEM1EF654321", "丰田"],
                ]),
            )
            .with_sheet(
                "发动机信息",
                Grid::from_text_rows(&[vec!["发动机型号", "排量"], vec!["EA888", "2.0"]]),
            );

        let output = structure(&mut source);
        let mappings = FieldMappingConfig::default();
        let validation = ValidationConfig::default();
        let assembly = VehicleAssembler::new(&mappings, &validation).assemble(&output);

        assert!(assembly.aggregates.iter().all(|a| a.engine.is_none()));
        assert_eq!(assembly.warnings.len(), 1);
    }

    #[test]
    fn test_sub_record_with_invalid_vin_creates_no_vehicle() {
        let mut source = MemoryWorkbook::new().with_sheet(
            "发动机信息",
            Grid::from_text_rows(&[
                vec!["VIN码", "发动机型号", "排量"],
                vec!["BAD", "EA888", "2.0"],
                vec!["LVSHFAEM1EF123456", "EA211", "1.4"],
            ]),
        );

        let output = structure(&mut source);
        let mappings = FieldMappingConfig::default();
        let validation = ValidationConfig::default();
        let assembly = VehicleAssembler::new(&mappings, &validation).assemble(&output);

        assert_eq!(assembly.aggregates.len(), 1);
        assert_eq!(assembly.aggregates[0].vehicle.vin, "LVSHFAEM1EF123456");
        assert_eq!(assembly.warnings.len(), 1);
        assert!(assembly.warnings[0].contains("BAD"));
    }

    #[test]
    fn test_single_vehicle_fallback_ignores_sheet_order() {
        // 带新 VIN 的子记录排在无 VIN 子记录之前
        let mut source = MemoryWorkbook::new()
            .with_sheet(
                "车辆信息",
                Grid::from_text_rows(&[vec!["VIN码", "品牌"], vec!["LVSHFAEM1EF123456", "大众"]]),
            )
            .with_sheet(
                "发动机信息",
                Grid::from_text_rows(&[
                    vec!["VIN码", "发动机型号"],
                    vec!["LVSHFAEM1EF654321", "EA211"],
                ]),
            )
            .with_sheet(
                "排放信息",
                Grid::from_text_rows(&[vec!["排放标准", "油耗"], vec!["国六", "6.5"]]),
            );

        let output = structure(&mut source);
        let mappings = FieldMappingConfig::default();
        let validation = ValidationConfig::default();
        let assembly = VehicleAssembler::new(&mappings, &validation).assemble(&output);

        assert_eq!(assembly.aggregates.len(), 2);
        let only = &assembly.aggregates[0];
        assert_eq!(only.vehicle.vin, "LVSHFAEM1EF123456");
        assert_eq!(
            only.emission.as_ref().map(|e| e.emission_standard.as_str()),
            Some("国六")
        );
        assert!(assembly.aggregates[1].emission.is_none());
    }

    #[test]
    fn test_split_unit() {
        assert_eq!(split_unit("功率(kW)"), ("功率".to_string(), Some("kW".to_string())));
        assert_eq!(split_unit("扭矩（N·m）"), ("扭矩".to_string(), Some("N·m".to_string())));
        assert_eq!(split_unit("颜色"), ("颜色".to_string(), None));
    }

    #[test]
    fn test_parse_date_text_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 3, 15);
        assert_eq!(parse_date_text("2023-03-15"), expected);
        assert_eq!(parse_date_text("2023/03/15"), expected);
        assert_eq!(parse_date_text("2023年03月15日"), expected);
        assert_eq!(parse_date_text("15.03.2023"), None);
    }
}

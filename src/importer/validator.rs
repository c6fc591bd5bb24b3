// ==========================================
// 汽车数据处理工具 - 结构化结果校验器
// ==========================================
// 规则:
//   - 没有任何类别产出记录 → 警告（不影响有效性）
//   - 车辆识别码存在且长度 ≠ 17 → 错误（每条记录一条）
//   - 工作表名命中多个类别 → 警告
//   - 工作表读取失败 → 警告
// 有效性: is_valid ⇔ errors 为空
// ==========================================

use crate::config::ValidationConfig;
use crate::domain::{SheetContent, StructuredOutput, ValidationReport, ValidationStatistics};
use crate::i18n::t_with_args;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, output: &StructuredOutput) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // ===== 是否有结构化数据 =====
        if output.total_records() == 0 {
            warnings.push(t_with_args("validation.no_structured_data", &[]));
        }

        // ===== 车辆识别码长度 =====
        for record in output.records_of(&self.config.identifier_category) {
            if let Some(value) = record.get(&self.config.identifier_field) {
                let text = value.to_string();
                if text.chars().count() != self.config.identifier_length {
                    errors.push(t_with_args(
                        "validation.identifier_length",
                        &[
                            ("value", text.as_str()),
                            ("expected", &self.config.identifier_length.to_string()),
                        ],
                    ));
                }
            }
        }

        // ===== 工作表级提示 =====
        for sheet in output.sheets.values() {
            if sheet.is_ambiguous() {
                warnings.push(t_with_args(
                    "validation.ambiguous_sheet",
                    &[
                        ("sheet", sheet.name.as_str()),
                        ("candidates", &sheet.matched_categories.join(", ")),
                        ("category", sheet.category.as_deref().unwrap_or("")),
                    ],
                ));
            }
            if let SheetContent::Error { message } = &sheet.content {
                warnings.push(t_with_args(
                    "validation.sheet_failed",
                    &[("sheet", sheet.name.as_str()), ("error", message.as_str())],
                ));
            }
        }

        // ===== 统计 =====
        let statistics = ValidationStatistics {
            sheet_count: output.sheets.len(),
            category_counts: output
                .categorized
                .iter()
                .filter(|(_, records)| !records.is_empty())
                .map(|(category, records)| (category.clone(), records.len()))
                .collect(),
            total_records: output.total_records(),
        };

        debug!(
            errors = errors.len(),
            warnings = warnings.len(),
            total_records = statistics.total_records,
            "校验完成"
        );

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            statistics,
        }
    }
}

// ==========================================
// 汽车数据处理工具 - 表格结构化器
// ==========================================
// 流程: 加载网格 → 检测表头 → 物化 RawRecord → 工作表归类 → 标准字段投影
// 红线:
//   - 工作表按文件顺序处理，类别按配置顺序匹配，首个命中生效
//   - 标准字段取首个非空别名的值，后续别名不覆盖
//   - 投影为空的记录直接丢弃
//   - 单个工作表失败只记录日志，不影响其他工作表
// ==========================================

use crate::config::{CategoryMapping, FieldMappingConfig};
use crate::domain::{
    CanonicalRecord, CellValue, Grid, RawRecord, SheetContent, SheetResult, StructuredOutput,
};
use crate::importer::grid_loader::WorkbookSource;
use crate::importer::header_detector::HeaderDetector;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// 预览时最多展示的工作表数
pub const PREVIEW_SHEET_LIMIT: usize = 3;

pub struct Structurer {
    detector: HeaderDetector,
    mappings: Arc<FieldMappingConfig>,
}

impl Structurer {
    /// # 参数
    /// - detector: 表头检测器
    /// - mappings: 字段映射快照（整个结构化过程只读）
    pub fn new(detector: HeaderDetector, mappings: Arc<FieldMappingConfig>) -> Self {
        Self { detector, mappings }
    }

    pub fn mappings(&self) -> &FieldMappingConfig {
        &self.mappings
    }

    // ==========================================
    // 结构化整个数据源
    // ==========================================
    #[instrument(skip_all)]
    pub fn structure(&self, source: &mut dyn WorkbookSource) -> StructuredOutput {
        let mut output = StructuredOutput {
            file_info: source.file_info(),
            ..Default::default()
        };

        for sheet_name in source.sheet_names() {
            let sheet = match source.load_grid(&sheet_name) {
                Ok(grid) => self.structure_sheet(&sheet_name, grid),
                Err(e) => {
                    error!(sheet = %sheet_name, error = %e, "解析工作表时出错，已跳过");
                    SheetResult {
                        name: sheet_name.clone(),
                        shape: (0, 0),
                        content: SheetContent::Error {
                            message: e.to_string(),
                        },
                        category: None,
                        matched_categories: Vec::new(),
                    }
                }
            };

            if let Some(category) = sheet.category.clone() {
                let records = self.project_sheet(&sheet, &category);
                if !records.is_empty() {
                    output
                        .categorized
                        .entry(category)
                        .or_default()
                        .extend(records);
                }
            }

            output.sheets.insert(sheet_name, sheet);
        }

        info!(
            sheets = output.sheets.len(),
            categories = output.categorized.len(),
            records = output.total_records(),
            "结构化完成"
        );
        output
    }

    // ==========================================
    // 单个工作表：表头检测 + 物化 + 归类
    // ==========================================
    pub fn structure_sheet(&self, sheet_name: &str, grid: Grid) -> SheetResult {
        let shape = grid.shape();
        let header_row = self.detector.detect(&grid);

        let usable = grid
            .row(header_row)
            .map(|row| row.iter().any(|c| !c.is_empty()))
            .unwrap_or(false);

        if grid.is_empty() || !usable {
            debug!(sheet = %sheet_name, "无可用表头，按原始数据携带");
            return SheetResult {
                name: sheet_name.to_string(),
                shape,
                content: SheetContent::Raw {
                    rows: grid.into_rows(),
                },
                category: None,
                matched_categories: Vec::new(),
            };
        }

        let (columns, records, row_indices) = materialize(&grid, header_row);
        let matched_categories = self.mappings.matching_categories(sheet_name);
        if matched_categories.len() > 1 {
            warn!(
                sheet = %sheet_name,
                candidates = ?matched_categories,
                "工作表名命中多个类别，按配置顺序取第一个"
            );
        }

        debug!(
            sheet = %sheet_name,
            header_row,
            columns = columns.len(),
            records = records.len(),
            "工作表已结构化"
        );

        SheetResult {
            name: sheet_name.to_string(),
            shape,
            content: SheetContent::Structured {
                header_row,
                columns,
                records,
                row_indices,
            },
            category: matched_categories.first().cloned(),
            matched_categories,
        }
    }

    /// 对已归类的结构化工作表做标准字段投影
    pub fn project_sheet(&self, sheet: &SheetResult, category: &str) -> Vec<CanonicalRecord> {
        let mapping = match self.mappings.category(category) {
            Ok(m) => m,
            Err(e) => {
                warn!(sheet = %sheet.name, error = %e, "类别不在当前映射中");
                return Vec::new();
            }
        };

        match &sheet.content {
            SheetContent::Structured {
                records,
                row_indices,
                ..
            } => records
                .iter()
                .zip(row_indices.iter())
                .filter_map(|(raw, row_index)| {
                    project_record(category, mapping, raw).map(|fields| CanonicalRecord {
                        category: category.to_string(),
                        sheet: sheet.name.clone(),
                        row_index: *row_index,
                        fields,
                    })
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    // ==========================================
    // 预览（前 3 个工作表，每表最多 max_rows 行）
    // ==========================================
    pub fn preview(&self, source: &mut dyn WorkbookSource, max_rows: usize) -> FilePreview {
        let mut sheets = IndexMap::new();
        for sheet_name in source.sheet_names().into_iter().take(PREVIEW_SHEET_LIMIT) {
            let preview = match source.load_grid(&sheet_name) {
                Ok(grid) => self.preview_grid(&grid, max_rows),
                Err(e) => SheetPreview {
                    error: Some(e.to_string()),
                    ..Default::default()
                },
            };
            sheets.insert(sheet_name, preview);
        }

        FilePreview {
            file_info: source.file_info(),
            sheets,
        }
    }

    fn preview_grid(&self, grid: &Grid, max_rows: usize) -> SheetPreview {
        if grid.is_empty() {
            return SheetPreview {
                shape: grid.shape(),
                ..Default::default()
            };
        }

        let header_row = self.detector.detect(grid);
        let (columns, records, _) = materialize(grid, header_row);
        let rows = records
            .iter()
            .take(max_rows)
            .map(|r| r.values().map(|v| v.to_string()).collect())
            .collect();

        SheetPreview {
            header_row: Some(header_row),
            columns,
            rows,
            shape: grid.shape(),
            error: None,
        }
    }
}

/// 投影单条原始记录（无任何标准字段时返回 None）
///
/// 每个标准字段按别名顺序查找，取第一个存在且非空的值。
pub fn project_record(
    category: &str,
    mapping: &CategoryMapping,
    raw: &RawRecord,
) -> Option<IndexMap<String, CellValue>> {
    let mut fields = IndexMap::new();
    for (field, aliases) in &mapping.field_aliases {
        let hit = aliases
            .iter()
            .filter_map(|alias| raw.get(alias))
            .find(|value| !value.is_empty());
        if let Some(value) = hit {
            fields.insert(field.clone(), value.clone());
        }
    }

    if fields.is_empty() {
        debug!(category, "记录无可映射字段，已丢弃");
        None
    } else {
        Some(fields)
    }
}

/// 以 header_row 为列名物化数据行
///
/// 返回 (列名, 原始记录, 记录对应的网格行号)。
/// 空列名记为 `Unnamed: <列号>`，重名列依次追加 `.1`、`.2`；完全空白的数据行跳过。
pub fn materialize(grid: &Grid, header_row: usize) -> (Vec<String>, Vec<RawRecord>, Vec<usize>) {
    let header = grid.row(header_row).unwrap_or(&[]);
    let columns = column_labels(header);

    let mut records = Vec::new();
    let mut row_indices = Vec::new();
    for (offset, row) in grid.rows().enumerate().skip(header_row + 1) {
        if row.iter().all(CellValue::is_empty) {
            continue;
        }
        let record: RawRecord = columns
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .collect();
        records.push(record);
        row_indices.push(offset);
    }

    (columns, records, row_indices)
}

fn column_labels(header: &[CellValue]) -> Vec<String> {
    let mut seen: IndexSet<String> = IndexSet::new();
    let mut labels = Vec::with_capacity(header.len());

    for (col, cell) in header.iter().enumerate() {
        let base = if cell.is_empty() {
            format!("Unnamed: {}", col)
        } else {
            cell.to_string().trim().to_string()
        };

        let mut label = base.clone();
        let mut suffix = 1;
        while seen.contains(&label) {
            label = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        seen.insert(label.clone());
        labels.push(label);
    }
    labels
}

// ==========================================
// 预览结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SheetPreview {
    pub header_row: Option<usize>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>, // 空单元格为 ""
    pub shape: (usize, usize),
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilePreview {
    pub file_info: Option<crate::domain::FileInfo>,
    pub sheets: IndexMap<String, SheetPreview>,
}

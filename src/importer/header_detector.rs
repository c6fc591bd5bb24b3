// ==========================================
// 汽车数据处理工具 - 表头检测器
// ==========================================
// 规则: 自第 0 行起最多检查 max_check_rows 行
//   1. 非空率 < min_non_empty_ratio → 不可能是表头
//   2. 任一非空单元格文本包含关键词 → 认定为表头
// 兜底: 窗口内无命中返回 0（检测器从不失败）
// ==========================================

use crate::config::HeaderDetectionConfig;
use crate::domain::{CellValue, Grid};

#[derive(Debug, Clone, Default)]
pub struct HeaderDetector {
    config: HeaderDetectionConfig,
}

impl HeaderDetector {
    pub fn new(config: HeaderDetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HeaderDetectionConfig {
        &self.config
    }

    /// 表头行号（无命中回退到 0）
    pub fn detect(&self, grid: &Grid) -> usize {
        self.find_header(grid).unwrap_or(0)
    }

    /// 首个满足条件的行号
    pub fn find_header(&self, grid: &Grid) -> Option<usize> {
        grid.rows()
            .take(self.config.max_check_rows)
            .position(|row| self.is_likely_header(row))
    }

    pub fn is_likely_header(&self, row: &[CellValue]) -> bool {
        if row.is_empty() {
            return false;
        }

        let non_empty = row.iter().filter(|c| !c.is_empty()).count();
        if (non_empty as f64) < (row.len() as f64) * self.config.min_non_empty_ratio {
            return false;
        }

        row.iter().filter(|c| !c.is_empty()).any(|cell| {
            let text = cell.to_string();
            self.config.keywords.iter().any(|k| text.contains(k.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> HeaderDetector {
        HeaderDetector::default()
    }

    #[test]
    fn test_detects_header_below_title_rows() {
        let grid = Grid::from_text_rows(&[
            vec!["2024年车辆参数汇总", "", "", ""],
            vec!["", "", "", ""],
            vec!["VIN码", "品牌", "车型", "年份"],
            vec!["LVSHFAEM1EF123456", "大众", "帕萨特", "2020"],
        ]);
        assert_eq!(detector().detect(&grid), 2);
    }

    #[test]
    fn test_sparse_row_with_keyword_is_rejected() {
        // 第 0 行含关键词但非空率 1/5 < 0.30
        let grid = Grid::from_text_rows(&[
            vec!["发动机型号", "", "", "", ""],
            vec!["发动机型号", "排量", "功率", "扭矩", "燃料类型"],
        ]);
        assert_eq!(detector().detect(&grid), 1);
    }

    #[test]
    fn test_falls_back_to_zero_without_keywords() {
        let grid = Grid::from_text_rows(&[
            vec!["a", "b"],
            vec!["c", "d"],
        ]);
        assert_eq!(detector().find_header(&grid), None);
        assert_eq!(detector().detect(&grid), 0);
    }

    #[test]
    fn test_never_looks_past_window() {
        let mut rows: Vec<Vec<&str>> = vec![vec!["x", "y"]; 3];
        rows.push(vec!["VIN", "品牌"]);
        let grid = Grid::from_text_rows(&rows);

        let narrow = HeaderDetector::new(HeaderDetectionConfig::default().with_max_check_rows(3));
        assert_eq!(narrow.detect(&grid), 0);
        assert_eq!(detector().detect(&grid), 3);
    }

    #[test]
    fn test_numeric_cells_count_as_non_empty() {
        let grid = Grid::new(vec![vec![
            CellValue::from("Engine Code"),
            CellValue::Float(2.0),
            CellValue::Empty,
        ]]);
        assert_eq!(detector().find_header(&grid), Some(0));
    }
}

// ==========================================
// 汽车数据处理工具 - 原始网格加载器
// ==========================================
// 职责: 把数据源中的命名工作表读成 Grid（不假设表头位置）
// 支持: Excel (.xlsx/.xlsm/.xls/.ods) / CSV (.csv) / 内存工作簿
// ==========================================

use crate::domain::{CellValue, FileInfo, Grid};
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike};
use csv::ReaderBuilder;
use indexmap::IndexMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

// ==========================================
// WorkbookSource Trait
// ==========================================
// 用途: 结构化管道的输入端
// 实现者: ExcelWorkbook, CsvWorkbook, MemoryWorkbook
pub trait WorkbookSource {
    /// 工作表名称（文件内顺序）
    fn sheet_names(&self) -> Vec<String>;

    /// 加载单个工作表为网格
    fn load_grid(&mut self, sheet_name: &str) -> ImportResult<Grid>;

    /// 文件基本信息（内存数据源没有）
    fn file_info(&self) -> Option<FileInfo> {
        None
    }
}

// ==========================================
// RawGridLoader - 按扩展名选择数据源
// ==========================================
pub struct RawGridLoader;

impl RawGridLoader {
    /// 支持的扩展名（小写）
    pub const SUPPORTED_EXTENSIONS: &'static [&'static str] =
        &["xlsx", "xlsm", "xls", "xlsb", "ods", "csv"];

    pub fn is_supported(path: &Path) -> bool {
        Self::SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str())
    }

    /// 打开数据源
    pub fn open<P: AsRef<Path>>(path: P) -> ImportResult<Box<dyn WorkbookSource>> {
        let path = path.as_ref();

        // 检查文件存在
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        let ext = extension_of(path);
        match ext.as_str() {
            "csv" => Ok(Box::new(CsvWorkbook::open(path)?)),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Box::new(ExcelWorkbook::open(path)?)),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }

    /// 直接加载单个工作表
    pub fn load<P: AsRef<Path>>(path: P, sheet_name: &str) -> ImportResult<Grid> {
        let mut source = Self::open(path)?;
        source.load_grid(sheet_name)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// 读取文件基本信息
pub fn read_file_info(path: &Path, file_type: &str) -> ImportResult<FileInfo> {
    let meta = std::fs::metadata(path)?;
    Ok(FileInfo {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        file_path: path.display().to_string(),
        file_size: meta.len(),
        modified_time: meta.modified().ok().map(DateTime::<Local>::from),
        file_type: file_type.to_string(),
    })
}

// ==========================================
// ExcelWorkbook - calamine 数据源
// ==========================================
pub struct ExcelWorkbook {
    path: PathBuf,
    workbook: Sheets<BufReader<File>>,
    sheet_names: Vec<String>,
}

impl ExcelWorkbook {
    pub fn open(path: &Path) -> ImportResult<Self> {
        let workbook: Sheets<_> = open_workbook_auto(path)?;
        let sheet_names = workbook.sheet_names().to_vec();
        debug!(path = %path.display(), sheets = sheet_names.len(), "Excel 文件已打开");
        Ok(Self {
            path: path.to_path_buf(),
            workbook,
            sheet_names,
        })
    }
}

impl WorkbookSource for ExcelWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheet_names.clone()
    }

    fn load_grid(&mut self, sheet_name: &str) -> ImportResult<Grid> {
        if !self.sheet_names.iter().any(|n| n == sheet_name) {
            return Err(ImportError::SheetNotFound(sheet_name.to_string()));
        }
        let range = self.workbook.worksheet_range(sheet_name)?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(convert_cell).collect())
            .collect();
        Ok(Grid::new(rows))
    }

    fn file_info(&self) -> Option<FileInfo> {
        read_file_info(&self.path, "excel").ok()
    }
}

/// calamine 单元格 → CellValue
fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::from_text(s),
        Data::Float(f) => CellValue::Float(*f),
        Data::Int(i) => CellValue::Int(*i),
        Data::Bool(b) => CellValue::Bool(*b),
        // 公式错误（#N/A 等）按空值处理
        Data::Error(_) => CellValue::Empty,
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) if ndt.num_seconds_from_midnight() == 0 && ndt.nanosecond() == 0 => {
                CellValue::Date(ndt.date())
            }
            Some(ndt) => CellValue::DateTime(ndt),
            None => CellValue::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_iso_datetime(s),
        Data::DurationIso(s) => CellValue::from_text(s),
    }
}

fn parse_iso_datetime(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return CellValue::DateTime(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return CellValue::Date(d);
    }
    CellValue::from_text(trimmed)
}

// ==========================================
// CsvWorkbook - 单工作表（以文件名为表名）
// ==========================================
pub struct CsvWorkbook {
    path: PathBuf,
    sheet_name: String,
}

impl CsvWorkbook {
    pub fn open(path: &Path) -> ImportResult<Self> {
        let sheet_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Sheet1".to_string());
        Ok(Self {
            path: path.to_path_buf(),
            sheet_name,
        })
    }
}

impl WorkbookSource for CsvWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        vec![self.sheet_name.clone()]
    }

    fn load_grid(&mut self, sheet_name: &str) -> ImportResult<Grid> {
        if sheet_name != self.sheet_name {
            return Err(ImportError::SheetNotFound(sheet_name.to_string()));
        }

        let file = File::open(&self.path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false) // 表头位置交给检测器
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(infer_text_cell).collect());
        }
        Ok(Grid::new(rows))
    }

    fn file_info(&self) -> Option<FileInfo> {
        read_file_info(&self.path, "csv").ok()
    }
}

/// 文本单元格类型推断（整数 / 浮点 / 文本）
pub fn infer_text_cell(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return CellValue::Int(i);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => CellValue::Float(f),
        _ => CellValue::Text(trimmed.to_string()),
    }
}

// ==========================================
// MemoryWorkbook - 内存数据源
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: IndexMap<String, Result<Grid, String>>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, name: &str, grid: Grid) -> Self {
        self.sheets.insert(name.to_string(), Ok(grid));
        self
    }

    /// 添加一个读取即失败的工作表
    pub fn with_unreadable_sheet(mut self, name: &str, message: &str) -> Self {
        self.sheets.insert(name.to_string(), Err(message.to_string()));
        self
    }
}

impl WorkbookSource for MemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.keys().cloned().collect()
    }

    fn load_grid(&mut self, sheet_name: &str) -> ImportResult<Grid> {
        match self.sheets.get(sheet_name) {
            Some(Ok(grid)) => Ok(grid.clone()),
            Some(Err(message)) => Err(ImportError::ExcelParseError(message.clone())),
            None => Err(ImportError::SheetNotFound(sheet_name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_csv_grid_keeps_all_rows() {
        let mut temp_file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(temp_file, "车辆检测数据,,").unwrap();
        writeln!(temp_file, "VIN码,品牌,排量").unwrap();
        writeln!(temp_file, "LVSHFAEM1EF123456,大众,2.0").unwrap();

        let mut source = RawGridLoader::open(temp_file.path()).unwrap();
        let name = source.sheet_names().remove(0);
        let grid = source.load_grid(&name).unwrap();

        assert_eq!(grid.shape(), (3, 3));
        assert_eq!(grid.row(2).unwrap()[2], CellValue::Float(2.0));
        assert!(source.file_info().is_some());
    }

    #[test]
    fn test_open_missing_file() {
        let result = RawGridLoader::open("non_existent.xlsx");
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_open_unsupported_extension() {
        let temp_file = Builder::new().suffix(".txt").tempfile().unwrap();
        let result = RawGridLoader::open(temp_file.path());
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(ext)) if ext == "txt"));
    }

    #[test]
    fn test_infer_text_cell() {
        assert_eq!(infer_text_cell("2020"), CellValue::Int(2020));
        assert_eq!(infer_text_cell(" 1.5 "), CellValue::Float(1.5));
        assert_eq!(infer_text_cell("EA888"), CellValue::Text("EA888".to_string()));
        assert_eq!(infer_text_cell("  "), CellValue::Empty);
    }

    #[test]
    fn test_memory_workbook_unreadable_sheet() {
        let mut source = MemoryWorkbook::new().with_unreadable_sheet("坏表", "decode failed");
        assert!(source.load_grid("坏表").is_err());
        assert!(matches!(
            source.load_grid("missing"),
            Err(ImportError::SheetNotFound(_))
        ));
    }
}

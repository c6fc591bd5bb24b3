// ==========================================
// 汽车数据处理工具 - 导入层
// ==========================================
// 职责: 表格文件 → 网格 → 结构化结果 → 校验 → 车辆聚合 → 落库
// 支持: Excel (.xlsx/.xlsm/.xls/.xlsb/.ods), CSV
// ==========================================

// 模块声明
pub mod assembler;
pub mod error;
pub mod grid_loader;
pub mod header_detector;
pub mod structurer;
pub mod validator;
pub mod vehicle_importer;

// 重导出核心类型
pub use assembler::{split_unit, Assembly, VehicleAssembler};
pub use error::{ImportError, ImportResult};
pub use grid_loader::{
    infer_text_cell, read_file_info, CsvWorkbook, ExcelWorkbook, MemoryWorkbook, RawGridLoader,
    WorkbookSource,
};
pub use header_detector::HeaderDetector;
pub use structurer::{
    materialize, project_record, FilePreview, SheetPreview, Structurer, PREVIEW_SHEET_LIMIT,
};
pub use validator::Validator;
pub use vehicle_importer::{ImportOutcome, VehicleImporter, VehicleImporterImpl};

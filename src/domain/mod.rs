// ==========================================
// 汽车数据处理工具 - 领域模型层
// ==========================================
// 职责: 定义单元格值、网格、结构化结果、报告与持久化实体
// 红线: 不含数据访问逻辑，不含解析/渲染逻辑
// ==========================================

pub mod grid;
pub mod report;
pub mod structured;
pub mod value;
pub mod vehicle;

// 重导出核心类型
pub use grid::Grid;
pub use report::{
    BatchResult, FailedItem, OutputKind, RenderOutcome, ResolvedFields,
    GENERATED_DATE_PLACEHOLDER, GENERATED_TIME_PLACEHOLDER,
};
pub use structured::{
    CanonicalRecord, FileInfo, RawRecord, SheetContent, SheetResult, StructuredOutput,
    ValidationReport, ValidationStatistics,
};
pub use value::{put_opt, CellValue, FieldMap, FieldValue};
pub use vehicle::{
    DataSource, Emission, EmissionDraft, Engine, EngineDraft, NewParameter, NewTestReport, Parameter,
    ParameterOwner, ProcessingStatus, TemplateRecord, TestReport, Transmission,
    TransmissionDraft, Vehicle, VehicleAggregate, VehicleDraft, VehicleProfile,
};

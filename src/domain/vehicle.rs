// ==========================================
// 汽车数据处理工具 - 车辆领域模型
// ==========================================
// 职责: 持久化实体（车辆 / 发动机 / 变速箱 / 排放 / 动态参数 / 测试报告 / 数据源 / 模板）
// 关系: Engine / Transmission / Emission 与 Vehicle 一对一；
//       各类 Parameter、TestReport 多对一
// ==========================================

use crate::domain::value::{put_opt, CellValue, FieldMap, FieldValue};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// Vehicle - 车辆基本信息
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub vin: String,                          // 车辆识别码（唯一）
    pub make: Option<String>,                 // 品牌
    pub model: Option<String>,                // 车型
    pub year: Option<i32>,                    // 年份
    pub production_date: Option<NaiveDate>,   // 生产日期
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// Engine - 发动机信息
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engine {
    pub id: i64,
    pub vehicle_id: i64,
    pub engine_code: String,              // 发动机型号
    pub displacement: Option<f64>,        // 排量(L)
    pub power: Option<f64>,               // 功率(kW)
    pub torque: Option<f64>,              // 扭矩(N·m)
    pub fuel_type: Option<String>,        // 燃料类型
    pub aspiration: Option<String>,       // 进气方式
    pub cylinder_count: Option<i32>,      // 气缸数
    pub configuration: Option<String>,    // 气缸排列
}

// ==========================================
// Transmission - 变速箱信息
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    pub id: i64,
    pub vehicle_id: i64,
    pub transmission_code: String,        // 变速箱型号
    pub transmission_type: Option<String>,// 变速箱类型
    pub gear_count: Option<i32>,          // 档位数
    pub drive_type: Option<String>,       // 驱动方式
}

// ==========================================
// Emission - 排放信息
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    pub id: i64,
    pub vehicle_id: i64,
    pub emission_standard: String,        // 排放标准
    pub co2_emission: Option<f64>,        // CO2排放(g/km)
    pub fuel_consumption: Option<f64>,    // 油耗(L/100km)
    pub test_method: Option<String>,      // 测试方法
    pub test_date: Option<NaiveDate>,     // 测试日期
}

// ==========================================
// Parameter - 动态参数（车辆/发动机/变速箱共用）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterOwner {
    Vehicle,
    Engine,
    Transmission,
}

impl ParameterOwner {
    /// 对应的参数表名
    pub fn table(&self) -> &'static str {
        match self {
            ParameterOwner::Vehicle => "vehicle_parameters",
            ParameterOwner::Engine => "engine_parameters",
            ParameterOwner::Transmission => "transmission_parameters",
        }
    }

    /// 参数表中的外键列
    pub fn owner_column(&self) -> &'static str {
        match self {
            ParameterOwner::Vehicle => "vehicle_id",
            ParameterOwner::Engine => "engine_id",
            ParameterOwner::Transmission => "transmission_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: i64,
    pub owner: ParameterOwner,
    pub owner_id: i64,
    pub name: String,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub category: Option<String>,
    pub source_file: Option<String>,
}

/// 待写入的动态参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewParameter {
    pub name: String,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub category: Option<String>,
    pub source_file: Option<String>,
}

// ==========================================
// TestReport - 测试报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub id: i64,
    pub vehicle_id: i64,
    pub report_type: String,
    pub test_date: NaiveDateTime,
    pub test_result: Option<String>,
    pub test_data: Option<serde_json::Value>,
    pub report_file: Option<String>,
    pub operator: Option<String>,
}

/// 待写入的测试报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTestReport {
    pub vehicle_id: i64,
    pub report_type: String,
    pub test_date: NaiveDateTime,
    pub test_result: Option<String>,
    pub test_data: Option<serde_json::Value>,
    pub report_file: Option<String>,
    pub operator: Option<String>,
}

// ==========================================
// DataSource - 文件级导入记录
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "processing" => ProcessingStatus::Processing,
            "completed" => ProcessingStatus::Completed,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Pending,
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: i64,
    pub batch_id: String,
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub file_size: Option<i64>,
    pub status: ProcessingStatus,
    pub processed_date: Option<NaiveDateTime>,
    pub error_message: Option<String>,
}

// ==========================================
// TemplateRecord - 已注册模板（持久化）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: i64,
    pub template_name: String,
    pub template_type: String,
    pub template_file: Option<String>,
    pub field_mapping: String, // JSON: 占位符 → 点分路径
    pub description: Option<String>,
    pub is_active: bool,
}

// ==========================================
// 写入草稿（导入组装产物）
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleDraft {
    pub vin: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub production_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineDraft {
    pub engine_code: String,
    pub displacement: Option<f64>,
    pub power: Option<f64>,
    pub torque: Option<f64>,
    pub fuel_type: Option<String>,
    pub aspiration: Option<String>,
    pub cylinder_count: Option<i32>,
    pub configuration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransmissionDraft {
    pub transmission_code: String,
    pub transmission_type: Option<String>,
    pub gear_count: Option<i32>,
    pub drive_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmissionDraft {
    pub emission_standard: String,
    pub co2_emission: Option<f64>,
    pub fuel_consumption: Option<f64>,
    pub test_method: Option<String>,
    pub test_date: Option<NaiveDate>,
}

/// 一辆车及其关联数据（一次事务内整体写入）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleAggregate {
    pub vehicle: VehicleDraft,
    pub engine: Option<EngineDraft>,
    pub transmission: Option<TransmissionDraft>,
    pub emission: Option<EmissionDraft>,
    pub vehicle_parameters: Vec<NewParameter>,
    pub engine_parameters: Vec<NewParameter>,
    pub transmission_parameters: Vec<NewParameter>,
}

// ==========================================
// VehicleProfile - 查询聚合视图
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleProfile {
    pub vehicle: Vehicle,
    pub engine: Option<Engine>,
    pub transmission: Option<Transmission>,
    pub emission: Option<Emission>,
    pub parameters: Vec<Parameter>,
}

impl VehicleProfile {
    /// 转为模板解析用的嵌套记录
    ///
    /// 顶层为车辆字段（vin / make / model / year / production_date），
    /// 关联实体挂在 engine / transmission / emission 之下；
    /// 车辆动态参数按名称挂在 parameters 之下。
    pub fn to_field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        let v = &self.vehicle;
        map.insert("vin".to_string(), FieldValue::Scalar(CellValue::Text(v.vin.clone())));
        put_opt(&mut map, "make", v.make.clone());
        put_opt(&mut map, "model", v.model.clone());
        put_opt(&mut map, "year", v.year);
        put_opt(&mut map, "production_date", v.production_date);

        if let Some(engine) = &self.engine {
            let mut sub = FieldMap::new();
            sub.insert(
                "engine_code".to_string(),
                FieldValue::Scalar(CellValue::Text(engine.engine_code.clone())),
            );
            put_opt(&mut sub, "displacement", engine.displacement);
            put_opt(&mut sub, "power", engine.power);
            put_opt(&mut sub, "torque", engine.torque);
            put_opt(&mut sub, "fuel_type", engine.fuel_type.clone());
            put_opt(&mut sub, "aspiration", engine.aspiration.clone());
            put_opt(&mut sub, "cylinder_count", engine.cylinder_count);
            put_opt(&mut sub, "configuration", engine.configuration.clone());
            map.insert("engine".to_string(), FieldValue::Map(sub));
        }

        if let Some(transmission) = &self.transmission {
            let mut sub = FieldMap::new();
            sub.insert(
                "transmission_code".to_string(),
                FieldValue::Scalar(CellValue::Text(transmission.transmission_code.clone())),
            );
            put_opt(&mut sub, "transmission_type", transmission.transmission_type.clone());
            put_opt(&mut sub, "gear_count", transmission.gear_count);
            put_opt(&mut sub, "drive_type", transmission.drive_type.clone());
            map.insert("transmission".to_string(), FieldValue::Map(sub));
        }

        if let Some(emission) = &self.emission {
            let mut sub = FieldMap::new();
            sub.insert(
                "emission_standard".to_string(),
                FieldValue::Scalar(CellValue::Text(emission.emission_standard.clone())),
            );
            put_opt(&mut sub, "co2_emission", emission.co2_emission);
            put_opt(&mut sub, "fuel_consumption", emission.fuel_consumption);
            put_opt(&mut sub, "test_method", emission.test_method.clone());
            put_opt(&mut sub, "test_date", emission.test_date);
            map.insert("emission".to_string(), FieldValue::Map(sub));
        }

        let mut params = FieldMap::new();
        for p in self
            .parameters
            .iter()
            .filter(|p| p.owner == ParameterOwner::Vehicle)
        {
            put_opt(&mut params, &p.name, p.value.clone());
        }
        if !params.is_empty() {
            map.insert("parameters".to_string(), FieldValue::Map(params));
        }

        map
    }
}

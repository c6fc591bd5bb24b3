// ==========================================
// 车辆查询 API
// ==========================================
// 职责: 按 VIN / 发动机型号检索车辆档案，列出车辆
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::{TestReport, Vehicle, VehicleProfile};
use crate::repository::{TestReportRepository, VehicleRepository};
use std::sync::Arc;
use tracing::debug;

pub struct QueryApi {
    vehicles: Arc<VehicleRepository>,
    reports: Arc<TestReportRepository>,
}

impl QueryApi {
    pub fn new(vehicles: Arc<VehicleRepository>, reports: Arc<TestReportRepository>) -> Self {
        Self { vehicles, reports }
    }

    /// 按 VIN 查询完整档案（车辆 + 发动机 + 变速箱 + 排放 + 动态参数）
    ///
    /// # 返回
    /// - Ok(VehicleProfile)
    /// - Err(ApiError::NotFound): VIN 不存在
    pub fn search_by_vin(&self, vin: &str) -> ApiResult<VehicleProfile> {
        let vin = required(vin, "VIN")?;
        debug!(vin, "按 VIN 查询车辆");
        self.vehicles
            .find_by_vin(vin)?
            .ok_or_else(|| ApiError::NotFound(format!("VIN {} 对应的车辆不存在", vin)))
    }

    /// 按发动机型号查询搭载该发动机的全部车辆（无结果时为空列表）
    pub fn search_by_engine_code(&self, engine_code: &str) -> ApiResult<Vec<VehicleProfile>> {
        let engine_code = required(engine_code, "发动机型号")?;
        debug!(engine_code, "按发动机型号查询车辆");
        Ok(self.vehicles.find_by_engine_code(engine_code)?)
    }

    pub fn list_vehicles(&self) -> ApiResult<Vec<Vehicle>> {
        Ok(self.vehicles.list_all()?)
    }

    pub fn count_vehicles(&self) -> ApiResult<i64> {
        Ok(self.vehicles.count()?)
    }

    /// 某车辆已生成的报告记录
    pub fn list_reports(&self, vin: &str) -> ApiResult<Vec<TestReport>> {
        let profile = self.search_by_vin(vin)?;
        Ok(self.reports.list_by_vehicle(profile.vehicle.id)?)
    }
}

fn required<'a>(raw: &'a str, what: &str) -> ApiResult<&'a str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidInput(format!("{}不能为空", what)));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::domain::{EngineDraft, VehicleAggregate, VehicleDraft};
    use crate::repository::ensure_schema;
    use std::sync::Mutex;

    fn api_with_vehicle() -> QueryApi {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let vehicles = Arc::new(VehicleRepository::from_connection(conn.clone()));
        vehicles
            .save_aggregates(&[VehicleAggregate {
                vehicle: VehicleDraft {
                    vin: "LVSHFAEM1EF123456".to_string(),
                    make: Some("大众".to_string()),
                    ..Default::default()
                },
                engine: Some(EngineDraft {
                    engine_code: "EA888".to_string(),
                    displacement: Some(2.0),
                    ..Default::default()
                }),
                ..Default::default()
            }])
            .unwrap();
        QueryApi::new(vehicles, Arc::new(TestReportRepository::from_connection(conn)))
    }

    #[test]
    fn test_search_by_vin() {
        let api = api_with_vehicle();
        let profile = api.search_by_vin(" LVSHFAEM1EF123456 ").unwrap();
        assert_eq!(profile.vehicle.make.as_deref(), Some("大众"));
        assert!(matches!(
            api.search_by_vin("LVSHFAEM1EF999999"),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(api.search_by_vin(""), Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_search_by_engine_code() {
        let api = api_with_vehicle();
        assert_eq!(api.search_by_engine_code("EA888").unwrap().len(), 1);
        assert!(api.search_by_engine_code("EA211").unwrap().is_empty());
        assert_eq!(api.list_vehicles().unwrap().len(), 1);
    }
}

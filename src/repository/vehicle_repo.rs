// ==========================================
// 汽车数据处理工具 - 车辆数据仓储
// ==========================================
// 职责: 车辆聚合的事务化写入 + 按 VIN / 发动机型号 / 全量查询
// 红线: Repository 不含业务逻辑，只做数据 CRUD
// 事务: save_aggregates 整批一个事务，任一失败整体回滚
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::{
    Emission, EmissionDraft, Engine, EngineDraft, NewParameter, Parameter, ParameterOwner,
    Transmission, TransmissionDraft, Vehicle, VehicleAggregate, VehicleDraft, VehicleProfile,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::schema::ensure_schema;
use indexmap::IndexSet;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// 一次写入的汇总
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaveSummary {
    pub vehicles: usize,
    pub engines: usize,
    pub transmissions: usize,
    pub emissions: usize,
    pub parameters: usize,
}

// ==========================================
// VehicleRepository - 车辆仓储
// ==========================================
pub struct VehicleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl VehicleRepository {
    /// 创建新的 VehicleRepository 实例（确保表结构存在）
    pub fn new<P: AsRef<Path>>(db_path: P) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入
    // ==========================================

    /// 批量保存车辆聚合（单事务）
    ///
    /// 同一 VIN 再次导入时：车辆/发动机/变速箱/排放只用新值覆盖非空项，
    /// 同一来源文件的动态参数先删除再写入（不会重复累积）。
    pub fn save_aggregates(&self, aggregates: &[VehicleAggregate]) -> RepositoryResult<SaveSummary> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let mut summary = SaveSummary::default();
        for aggregate in aggregates {
            let vehicle_id = Self::upsert_vehicle_tx(&tx, &aggregate.vehicle)?;
            summary.vehicles += 1;

            summary.parameters += Self::insert_parameters_tx(
                &tx,
                ParameterOwner::Vehicle,
                vehicle_id,
                &aggregate.vehicle_parameters,
            )?;

            if let Some(engine) = &aggregate.engine {
                let engine_id = Self::upsert_engine_tx(&tx, vehicle_id, engine)?;
                summary.engines += 1;
                summary.parameters += Self::insert_parameters_tx(
                    &tx,
                    ParameterOwner::Engine,
                    engine_id,
                    &aggregate.engine_parameters,
                )?;
            }

            if let Some(transmission) = &aggregate.transmission {
                let transmission_id = Self::upsert_transmission_tx(&tx, vehicle_id, transmission)?;
                summary.transmissions += 1;
                summary.parameters += Self::insert_parameters_tx(
                    &tx,
                    ParameterOwner::Transmission,
                    transmission_id,
                    &aggregate.transmission_parameters,
                )?;
            }

            if let Some(emission) = &aggregate.emission {
                Self::upsert_emission_tx(&tx, vehicle_id, emission)?;
                summary.emissions += 1;
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        info!(
            vehicles = summary.vehicles,
            engines = summary.engines,
            transmissions = summary.transmissions,
            emissions = summary.emissions,
            parameters = summary.parameters,
            "车辆聚合写入完成"
        );
        Ok(summary)
    }

    /// 新增单辆车（VIN 重复返回唯一约束错误）
    pub fn insert_vehicle(&self, draft: &VehicleDraft) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO vehicles (vin, make, model, year, production_date)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                draft.vin,
                draft.make,
                draft.model,
                draft.year,
                draft.production_date
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(vin = %draft.vin, id, "车辆信息添加成功");
        Ok(id)
    }

    fn upsert_vehicle_tx(tx: &Transaction, draft: &VehicleDraft) -> RepositoryResult<i64> {
        tx.execute(
            r#"
            INSERT INTO vehicles (vin, make, model, year, production_date)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(vin) DO UPDATE SET
                make = COALESCE(excluded.make, vehicles.make),
                model = COALESCE(excluded.model, vehicles.model),
                year = COALESCE(excluded.year, vehicles.year),
                production_date = COALESCE(excluded.production_date, vehicles.production_date),
                updated_at = datetime('now')
            "#,
            params![
                draft.vin,
                draft.make,
                draft.model,
                draft.year,
                draft.production_date
            ],
        )?;
        let id = tx.query_row(
            "SELECT id FROM vehicles WHERE vin = ?1",
            params![draft.vin],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn upsert_engine_tx(tx: &Transaction, vehicle_id: i64, e: &EngineDraft) -> RepositoryResult<i64> {
        tx.execute(
            r#"
            INSERT INTO engines (
                vehicle_id, engine_code, displacement, power, torque,
                fuel_type, aspiration, cylinder_count, configuration
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(vehicle_id) DO UPDATE SET
                engine_code = excluded.engine_code,
                displacement = COALESCE(excluded.displacement, engines.displacement),
                power = COALESCE(excluded.power, engines.power),
                torque = COALESCE(excluded.torque, engines.torque),
                fuel_type = COALESCE(excluded.fuel_type, engines.fuel_type),
                aspiration = COALESCE(excluded.aspiration, engines.aspiration),
                cylinder_count = COALESCE(excluded.cylinder_count, engines.cylinder_count),
                configuration = COALESCE(excluded.configuration, engines.configuration),
                updated_at = datetime('now')
            "#,
            params![
                vehicle_id,
                e.engine_code,
                e.displacement,
                e.power,
                e.torque,
                e.fuel_type,
                e.aspiration,
                e.cylinder_count,
                e.configuration
            ],
        )?;
        let id = tx.query_row(
            "SELECT id FROM engines WHERE vehicle_id = ?1",
            params![vehicle_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn upsert_transmission_tx(
        tx: &Transaction,
        vehicle_id: i64,
        t: &TransmissionDraft,
    ) -> RepositoryResult<i64> {
        tx.execute(
            r#"
            INSERT INTO transmissions (
                vehicle_id, transmission_code, transmission_type, gear_count, drive_type
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(vehicle_id) DO UPDATE SET
                transmission_code = excluded.transmission_code,
                transmission_type = COALESCE(excluded.transmission_type, transmissions.transmission_type),
                gear_count = COALESCE(excluded.gear_count, transmissions.gear_count),
                drive_type = COALESCE(excluded.drive_type, transmissions.drive_type),
                updated_at = datetime('now')
            "#,
            params![
                vehicle_id,
                t.transmission_code,
                t.transmission_type,
                t.gear_count,
                t.drive_type
            ],
        )?;
        let id = tx.query_row(
            "SELECT id FROM transmissions WHERE vehicle_id = ?1",
            params![vehicle_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn upsert_emission_tx(
        tx: &Transaction,
        vehicle_id: i64,
        e: &EmissionDraft,
    ) -> RepositoryResult<()> {
        tx.execute(
            r#"
            INSERT INTO emissions (
                vehicle_id, emission_standard, co2_emission, fuel_consumption, test_method, test_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(vehicle_id) DO UPDATE SET
                emission_standard = excluded.emission_standard,
                co2_emission = COALESCE(excluded.co2_emission, emissions.co2_emission),
                fuel_consumption = COALESCE(excluded.fuel_consumption, emissions.fuel_consumption),
                test_method = COALESCE(excluded.test_method, emissions.test_method),
                test_date = COALESCE(excluded.test_date, emissions.test_date),
                updated_at = datetime('now')
            "#,
            params![
                vehicle_id,
                e.emission_standard,
                e.co2_emission,
                e.fuel_consumption,
                e.test_method,
                e.test_date
            ],
        )?;
        Ok(())
    }

    fn insert_parameters_tx(
        tx: &Transaction,
        owner: ParameterOwner,
        owner_id: i64,
        parameters: &[NewParameter],
    ) -> RepositoryResult<usize> {
        if parameters.is_empty() {
            return Ok(0);
        }

        // 同一来源文件的旧参数整体替换
        let sources: IndexSet<Option<&str>> =
            parameters.iter().map(|p| p.source_file.as_deref()).collect();
        let delete_sql = format!(
            "DELETE FROM {} WHERE {} = ?1 AND source_file IS ?2",
            owner.table(),
            owner.owner_column()
        );
        for source in sources {
            tx.execute(&delete_sql, params![owner_id, source])?;
        }

        let sql = format!(
            r#"
            INSERT INTO {} (
                {}, parameter_name, parameter_value, parameter_unit, parameter_category, source_file
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            owner.table(),
            owner.owner_column()
        );
        let mut stmt = tx.prepare(&sql)?;

        let mut count = 0;
        for p in parameters {
            stmt.execute(params![
                owner_id,
                p.name,
                p.value,
                p.unit,
                p.category,
                p.source_file
            ])?;
            count += 1;
        }
        Ok(count)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 通过 VIN 查询完整信息
    pub fn find_by_vin(&self, vin: &str) -> RepositoryResult<Option<VehicleProfile>> {
        let conn = self.get_conn()?;
        let vehicle = conn
            .query_row(
                &format!("{} WHERE vin = ?1", SELECT_VEHICLE),
                params![vin.trim()],
                vehicle_from_row,
            )
            .optional()?;

        match vehicle {
            Some(v) => Ok(Some(load_profile(&conn, v)?)),
            None => Ok(None),
        }
    }

    /// 通过发动机型号查询相关车辆
    pub fn find_by_engine_code(&self, engine_code: &str) -> RepositoryResult<Vec<VehicleProfile>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE id IN (SELECT vehicle_id FROM engines WHERE engine_code = ?1) ORDER BY id",
            SELECT_VEHICLE
        ))?;
        let vehicles = stmt
            .query_map(params![engine_code.trim()], vehicle_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut profiles = Vec::with_capacity(vehicles.len());
        for v in vehicles {
            profiles.push(load_profile(&conn, v)?);
        }
        debug!(engine_code, count = profiles.len(), "按发动机型号查询完成");
        Ok(profiles)
    }

    /// 获取所有车辆
    pub fn list_all(&self) -> RepositoryResult<Vec<Vehicle>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_VEHICLE))?;
        let vehicles = stmt
            .query_map([], vehicle_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vehicles)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM vehicles", [], |row| row.get(0))?)
    }
}

const SELECT_VEHICLE: &str =
    "SELECT id, vin, make, model, year, production_date, created_at, updated_at FROM vehicles";

fn vehicle_from_row(row: &Row) -> rusqlite::Result<Vehicle> {
    Ok(Vehicle {
        id: row.get(0)?,
        vin: row.get(1)?,
        make: row.get(2)?,
        model: row.get(3)?,
        year: row.get(4)?,
        production_date: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// 补齐车辆的关联实体与动态参数
fn load_profile(conn: &Connection, vehicle: Vehicle) -> RepositoryResult<VehicleProfile> {
    let engine = conn
        .query_row(
            r#"
            SELECT id, vehicle_id, engine_code, displacement, power, torque,
                   fuel_type, aspiration, cylinder_count, configuration
            FROM engines WHERE vehicle_id = ?1
            "#,
            params![vehicle.id],
            |row| {
                Ok(Engine {
                    id: row.get(0)?,
                    vehicle_id: row.get(1)?,
                    engine_code: row.get(2)?,
                    displacement: row.get(3)?,
                    power: row.get(4)?,
                    torque: row.get(5)?,
                    fuel_type: row.get(6)?,
                    aspiration: row.get(7)?,
                    cylinder_count: row.get(8)?,
                    configuration: row.get(9)?,
                })
            },
        )
        .optional()?;

    let transmission = conn
        .query_row(
            r#"
            SELECT id, vehicle_id, transmission_code, transmission_type, gear_count, drive_type
            FROM transmissions WHERE vehicle_id = ?1
            "#,
            params![vehicle.id],
            |row| {
                Ok(Transmission {
                    id: row.get(0)?,
                    vehicle_id: row.get(1)?,
                    transmission_code: row.get(2)?,
                    transmission_type: row.get(3)?,
                    gear_count: row.get(4)?,
                    drive_type: row.get(5)?,
                })
            },
        )
        .optional()?;

    let emission = conn
        .query_row(
            r#"
            SELECT id, vehicle_id, emission_standard, co2_emission, fuel_consumption,
                   test_method, test_date
            FROM emissions WHERE vehicle_id = ?1
            "#,
            params![vehicle.id],
            |row| {
                Ok(Emission {
                    id: row.get(0)?,
                    vehicle_id: row.get(1)?,
                    emission_standard: row.get(2)?,
                    co2_emission: row.get(3)?,
                    fuel_consumption: row.get(4)?,
                    test_method: row.get(5)?,
                    test_date: row.get(6)?,
                })
            },
        )
        .optional()?;

    let mut parameters = load_parameters(conn, ParameterOwner::Vehicle, vehicle.id)?;
    if let Some(e) = &engine {
        parameters.extend(load_parameters(conn, ParameterOwner::Engine, e.id)?);
    }
    if let Some(t) = &transmission {
        parameters.extend(load_parameters(conn, ParameterOwner::Transmission, t.id)?);
    }

    Ok(VehicleProfile {
        vehicle,
        engine,
        transmission,
        emission,
        parameters,
    })
}

fn load_parameters(
    conn: &Connection,
    owner: ParameterOwner,
    owner_id: i64,
) -> RepositoryResult<Vec<Parameter>> {
    let sql = format!(
        r#"
        SELECT id, {col}, parameter_name, parameter_value, parameter_unit,
               parameter_category, source_file
        FROM {table} WHERE {col} = ?1 ORDER BY id
        "#,
        col = owner.owner_column(),
        table = owner.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![owner_id], |row| {
            Ok(Parameter {
                id: row.get(0)?,
                owner,
                owner_id: row.get(1)?,
                name: row.get(2)?,
                value: row.get(3)?,
                unit: row.get(4)?,
                category: row.get(5)?,
                source_file: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn repo() -> VehicleRepository {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        VehicleRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn aggregate(vin: &str, engine_code: Option<&str>) -> VehicleAggregate {
        VehicleAggregate {
            vehicle: VehicleDraft {
                vin: vin.to_string(),
                make: Some("大众".to_string()),
                ..Default::default()
            },
            engine: engine_code.map(|code| EngineDraft {
                engine_code: code.to_string(),
                displacement: Some(2.0),
                ..Default::default()
            }),
            engine_parameters: vec![NewParameter {
                name: "缸径".to_string(),
                value: Some("82.5".to_string()),
                unit: Some("mm".to_string()),
                category: Some("engine_info".to_string()),
                source_file: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_save_and_find_by_vin() {
        let repo = repo();
        let summary = repo
            .save_aggregates(&[aggregate("LVSHFAEM1EF123456", Some("EA888"))])
            .unwrap();
        assert_eq!(summary.vehicles, 1);
        assert_eq!(summary.engines, 1);
        assert_eq!(summary.parameters, 1);

        let profile = repo.find_by_vin("LVSHFAEM1EF123456").unwrap().unwrap();
        assert_eq!(profile.vehicle.make.as_deref(), Some("大众"));
        assert_eq!(profile.engine.as_ref().unwrap().engine_code, "EA888");
        assert_eq!(profile.parameters.len(), 1);
        assert_eq!(profile.parameters[0].owner, ParameterOwner::Engine);
        assert!(repo.find_by_vin("NOPE").unwrap().is_none());
    }

    #[test]
    fn test_reimport_updates_in_place() {
        let repo = repo();
        repo.save_aggregates(&[aggregate("LVSHFAEM1EF123456", Some("EA888"))])
            .unwrap();
        let mut again = aggregate("LVSHFAEM1EF123456", Some("EA211"));
        again.vehicle.make = None;
        if let Some(engine) = again.engine.as_mut() {
            engine.displacement = None;
            engine.power = Some(110.0);
        }
        repo.save_aggregates(&[again]).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        let profile = repo.find_by_vin("LVSHFAEM1EF123456").unwrap().unwrap();
        assert_eq!(profile.vehicle.make.as_deref(), Some("大众"), "空值不覆盖已有值");
        let engine = profile.engine.unwrap();
        assert_eq!(engine.engine_code, "EA211");
        assert_eq!(engine.displacement, Some(2.0), "空值不覆盖已有值");
        assert_eq!(engine.power, Some(110.0));
        // 同一来源的参数被替换而不是追加
        assert_eq!(profile.parameters.len(), 1);
    }

    #[test]
    fn test_parameters_replaced_per_source_file() {
        let repo = repo();
        let from = |source: &str, value: &str| {
            let mut a = aggregate("LVSHFAEM1EF123456", Some("EA888"));
            a.engine_parameters[0].source_file = Some(source.to_string());
            a.engine_parameters[0].value = Some(value.to_string());
            a
        };

        repo.save_aggregates(&[from("a.xlsx", "82.5")]).unwrap();
        repo.save_aggregates(&[from("a.xlsx", "83.0")]).unwrap();
        repo.save_aggregates(&[from("b.xlsx", "84.0")]).unwrap();

        let profile = repo.find_by_vin("LVSHFAEM1EF123456").unwrap().unwrap();
        let mut values: Vec<_> = profile
            .parameters
            .iter()
            .map(|p| (p.source_file.clone().unwrap(), p.value.clone().unwrap()))
            .collect();
        values.sort();
        assert_eq!(
            values,
            vec![
                ("a.xlsx".to_string(), "83.0".to_string()),
                ("b.xlsx".to_string(), "84.0".to_string()),
            ]
        );
    }

    #[test]
    fn test_find_by_engine_code() {
        let repo = repo();
        repo.save_aggregates(&[
            aggregate("LVSHFAEM1EF000001", Some("EA888")),
            aggregate("LVSHFAEM1EF000002", Some("EA211")),
            aggregate("LVSHFAEM1EF000003", Some("EA888")),
        ])
        .unwrap();

        let found = repo.find_by_engine_code("EA888").unwrap();
        let vins: Vec<_> = found.iter().map(|p| p.vehicle.vin.as_str()).collect();
        assert_eq!(vins, vec!["LVSHFAEM1EF000001", "LVSHFAEM1EF000003"]);
        assert_eq!(repo.list_all().unwrap().len(), 3);
    }

    #[test]
    fn test_failed_batch_leaves_nothing_behind() {
        let repo = repo();
        // 第二辆车的发动机写入被触发器拒绝 → 整批回滚
        {
            let conn = repo.get_conn().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON engines \
                 WHEN NEW.engine_code = 'BAD' BEGIN SELECT RAISE(ABORT, 'bad engine'); END;",
            )
            .unwrap();
        }
        let result = repo.save_aggregates(&[
            aggregate("LVSHFAEM1EF000001", Some("EA888")),
            aggregate("LVSHFAEM1EF000002", Some("BAD")),
        ]);
        assert!(result.is_err());
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_insert_vehicle_rejects_duplicate_vin() {
        let repo = repo();
        let draft = VehicleDraft {
            vin: "LVSHFAEM1EF123456".to_string(),
            ..Default::default()
        };
        repo.insert_vehicle(&draft).unwrap();
        assert!(matches!(
            repo.insert_vehicle(&draft),
            Err(RepositoryError::UniqueConstraintViolation(_))
        ));
    }
}

// ==========================================
// 汽车数据处理工具 - 测试报告仓储
// ==========================================
// 职责: 记录已生成的报告文件及其所属车辆
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::{NewTestReport, TestReport};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::schema::ensure_schema;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct TestReportRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TestReportRepository {
    pub fn new<P: AsRef<Path>>(db_path: P) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, report: &NewTestReport) -> RepositoryResult<i64> {
        let test_data = report
            .test_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO test_reports (
                vehicle_id, report_type, test_date, test_result, test_data, report_file, operator
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                report.vehicle_id,
                report.report_type,
                report.test_date,
                report.test_result,
                test_data,
                report.report_file,
                report.operator
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_by_vehicle(&self, vehicle_id: i64) -> RepositoryResult<Vec<TestReport>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, vehicle_id, report_type, test_date, test_result, test_data,
                   report_file, operator
            FROM test_reports WHERE vehicle_id = ?1 ORDER BY id
            "#,
        )?;

        let rows = stmt
            .query_map(params![vehicle_id], |row| {
                Ok((
                    TestReport {
                        id: row.get(0)?,
                        vehicle_id: row.get(1)?,
                        report_type: row.get(2)?,
                        test_date: row.get(3)?,
                        test_result: row.get(4)?,
                        test_data: None,
                        report_file: row.get(6)?,
                        operator: row.get(7)?,
                    },
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut report, raw)| -> RepositoryResult<TestReport> {
                report.test_data = raw.as_deref().map(serde_json::from_str).transpose()?;
                Ok(report)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use chrono::NaiveDate;

    #[test]
    fn test_insert_and_list() {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO vehicles (vin) VALUES ('LVSHFAEM1EF123456')",
            [],
        )
        .unwrap();
        let repo = TestReportRepository::from_connection(Arc::new(Mutex::new(conn)));

        let report = NewTestReport {
            vehicle_id: 1,
            report_type: "vehicle_emission_report".to_string(),
            test_date: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            test_result: Some("generated".to_string()),
            test_data: Some(serde_json::json!({"[VIN码]": "LVSHFAEM1EF123456"})),
            report_file: Some("out/report.pdf".to_string()),
            operator: None,
        };
        repo.insert(&report).unwrap();

        let listed = repo.list_by_vehicle(1).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].test_date, report.test_date);
        assert_eq!(listed[0].test_data, report.test_data);
    }

    #[test]
    fn test_insert_requires_vehicle() {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let repo = TestReportRepository::from_connection(Arc::new(Mutex::new(conn)));
        let report = NewTestReport {
            vehicle_id: 99,
            report_type: "x".to_string(),
            test_date: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            test_result: None,
            test_data: None,
            report_file: None,
            operator: None,
        };
        assert!(matches!(
            repo.insert(&report),
            Err(RepositoryError::ForeignKeyViolation(_))
        ));
    }
}

// ==========================================
// 汽车数据处理工具 - 数据源（导入记录）仓储
// ==========================================
// 职责: 记录每个被导入文件的批次、状态与错误信息
// 状态流转: pending → processing → completed / failed
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::{DataSource, FileInfo, ProcessingStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::schema::ensure_schema;
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub struct DataSourceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DataSourceRepository {
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

    /// 登记一个待处理文件，返回记录 ID
    pub fn create(&self, batch_id: &str, info: &FileInfo) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO data_sources (batch_id, file_name, file_path, file_type, file_size, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                batch_id,
                info.file_name,
                info.file_path,
                info.file_type,
                i64::try_from(info.file_size).ok(),
                ProcessingStatus::Pending.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 更新处理状态（终态会写入处理时间）
    pub fn update_status(
        &self,
        id: i64,
        status: ProcessingStatus,
        error_message: Option<&str>,
    ) -> RepositoryResult<()> {
        let processed_date = match status {
            ProcessingStatus::Completed | ProcessingStatus::Failed => {
                Some(Local::now().naive_local())
            }
            _ => None,
        };

        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE data_sources
            SET status = ?1,
                error_message = ?2,
                processed_date = COALESCE(?3, processed_date),
                updated_at = datetime('now')
            WHERE id = ?4
            "#,
            params![status.as_str(), error_message, processed_date, id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "DataSource".to_string(),
                id: id.to_string(),
            });
        }
        debug!(id, status = %status, "数据源状态已更新");
        Ok(())
    }

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<DataSource>> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_DATA_SOURCE),
                params![id],
                data_source_from_row,
            )
            .optional()?;
        Ok(found)
    }

    /// 按批次列出（批次内按登记顺序）
    pub fn list_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<DataSource>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE batch_id = ?1 ORDER BY id",
            SELECT_DATA_SOURCE
        ))?;
        let rows = stmt
            .query_map(params![batch_id], data_source_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 最近的导入记录
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<DataSource>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY id DESC LIMIT ?1",
            SELECT_DATA_SOURCE
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], data_source_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

const SELECT_DATA_SOURCE: &str = "SELECT id, batch_id, file_name, file_path, file_type, \
     file_size, status, processed_date, error_message FROM data_sources";

fn data_source_from_row(row: &Row) -> rusqlite::Result<DataSource> {
    let status: String = row.get(6)?;
    Ok(DataSource {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        file_name: row.get(2)?,
        file_path: row.get(3)?,
        file_type: row.get(4)?,
        file_size: row.get(5)?,
        status: ProcessingStatus::parse(&status),
        processed_date: row.get(7)?,
        error_message: row.get(8)?,
    })
}

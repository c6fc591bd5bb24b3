// ==========================================
// 汽车数据处理工具 - 模板仓储
// ==========================================
// 职责: 持久化用户创建的报告模板，启动时回灌模板注册表
// 存储: field_mapping 列为 JSON 对象（占位符 → 点分路径，保持顺序）
// ==========================================

use crate::config::TemplateConfig;
use crate::db::open_sqlite_connection;
use crate::domain::TemplateRecord;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::schema::ensure_schema;
use indexmap::IndexMap;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct TemplateRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TemplateRepository {
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

    /// 按模板名新增或覆盖
    pub fn upsert(&self, template: &TemplateConfig, template_type: &str) -> RepositoryResult<i64> {
        let field_mapping = serde_json::to_string(&template.fields)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO templates (
                template_name, template_type, template_file, field_mapping, description, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1)
            ON CONFLICT(template_name) DO UPDATE SET
                template_type = excluded.template_type,
                template_file = excluded.template_file,
                field_mapping = excluded.field_mapping,
                description = excluded.description,
                is_active = 1,
                updated_at = datetime('now')
            "#,
            params![
                template.name,
                template_type,
                template.template_file,
                field_mapping,
                template.title
            ],
        )?;
        let id = conn.query_row(
            "SELECT id FROM templates WHERE template_name = ?1",
            params![template.name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn find_by_name(&self, name: &str) -> RepositoryResult<Option<TemplateRecord>> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                &format!("{} WHERE template_name = ?1", SELECT_TEMPLATE),
                params![name],
                template_from_row,
            )
            .optional()?;
        Ok(found)
    }

    pub fn list_active(&self) -> RepositoryResult<Vec<TemplateRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE is_active = 1 ORDER BY id",
            SELECT_TEMPLATE
        ))?;
        let rows = stmt
            .query_map([], template_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 全部启用模板转为运行时配置
    pub fn load_active_configs(&self) -> RepositoryResult<Vec<TemplateConfig>> {
        self.list_active()?
            .into_iter()
            .map(|record| to_template_config(&record))
            .collect()
    }
}

/// 持久化记录 → 运行时模板配置
pub fn to_template_config(record: &TemplateRecord) -> RepositoryResult<TemplateConfig> {
    let fields: IndexMap<String, String> =
        serde_json::from_str(&record.field_mapping).map_err(|e| {
            RepositoryError::FieldValueError {
                field: "field_mapping".to_string(),
                message: format!("{}: {}", record.template_name, e),
            }
        })?;
    Ok(TemplateConfig {
        name: record.template_name.clone(),
        title: record.description.clone(),
        template_file: record.template_file.clone(),
        fields,
    })
}

const SELECT_TEMPLATE: &str = "SELECT id, template_name, template_type, template_file, \
     field_mapping, description, is_active FROM templates";

fn template_from_row(row: &Row) -> rusqlite::Result<TemplateRecord> {
    Ok(TemplateRecord {
        id: row.get(0)?,
        template_name: row.get(1)?,
        template_type: row.get(2)?,
        template_file: row.get(3)?,
        field_mapping: row.get(4)?,
        description: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn repo() -> TemplateRepository {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        TemplateRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_upsert_roundtrips_field_order() {
        let repo = repo();
        let template = TemplateConfig::new("inspection")
            .with_template_file("inspection_template.docx")
            .with_field("[VIN码]", "vin")
            .with_field("[排量]", "engine.displacement");
        repo.upsert(&template, "docx").unwrap();

        let configs = repo.load_active_configs().unwrap();
        assert_eq!(configs, vec![template]);
    }

    #[test]
    fn test_upsert_overwrites_same_name() {
        let repo = repo();
        let first = TemplateConfig::new("t").with_field("[a]", "a");
        let id1 = repo.upsert(&first, "docx").unwrap();
        let second = TemplateConfig::new("t").with_field("[b]", "b");
        let id2 = repo.upsert(&second, "xlsx").unwrap();

        assert_eq!(id1, id2);
        let record = repo.find_by_name("t").unwrap().unwrap();
        assert_eq!(record.template_type, "xlsx");
        assert_eq!(repo.list_active().unwrap().len(), 1);
    }
}

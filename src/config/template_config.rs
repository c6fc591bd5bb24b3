// ==========================================
// 汽车数据处理工具 - 报告模板配置
// ==========================================
// 职责: 模板名 → 有序 {占位符 → 点分路径}
// 内置: vehicle_basic_info / vehicle_emission_report
// 并发: 同字段映射注册表，写时复制整体发布
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::info;

/// 点分路径分隔符
pub const PATH_SEPARATOR: char = '.';

/// 模板名与模板文件名只能落在模板目录内
fn is_plain_file_name(name: &str) -> bool {
    !name.contains(['/', '\\']) && !name.contains("..")
}

// ==========================================
// TemplateConfig - 单个模板
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>, // 报告标题（缺省用本地化标题）
    #[serde(default)]
    pub template_file: Option<String>, // 模板目录下的文档模板文件名
    #[serde(default)]
    pub fields: IndexMap<String, String>, // 占位符 → 点分路径
}

impl TemplateConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            title: None,
            template_file: None,
            fields: IndexMap::new(),
        }
    }

    pub fn with_template_file(mut self, file: &str) -> Self {
        self.template_file = Some(file.to_string());
        self
    }

    pub fn with_field(mut self, placeholder: &str, path: &str) -> Self {
        self.fields.insert(placeholder.to_string(), path.to_string());
        self
    }

    /// 形状校验：名称、占位符非空；路径的每一段非空
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: String| ConfigError::InvalidTemplate {
            template: self.name.clone(),
            message,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("模板名不能为空".to_string()));
        }
        if !is_plain_file_name(&self.name) {
            return Err(invalid(format!("模板名不能包含路径: '{}'", self.name)));
        }
        if let Some(file) = &self.template_file {
            if file.trim().is_empty() {
                return Err(invalid("模板文件名不能为空串".to_string()));
            }
            if !is_plain_file_name(file) {
                return Err(invalid(format!("模板文件名不能包含路径: '{}'", file)));
            }
        }
        for (placeholder, path) in &self.fields {
            if placeholder.trim().is_empty() {
                return Err(invalid("占位符不能为空".to_string()));
            }
            if path.split(PATH_SEPARATOR).any(|seg| seg.trim().is_empty()) {
                return Err(invalid(format!("占位符 {} 的路径无效: '{}'", placeholder, path)));
            }
        }
        Ok(())
    }
}

/// 模板表（有序）
pub type TemplateTable = IndexMap<String, TemplateConfig>;

/// 内置模板
pub fn builtin_templates() -> Vec<TemplateConfig> {
    vec![
        TemplateConfig::new("vehicle_emission_report")
            .with_template_file("vehicle_emission_template.docx")
            .with_field("[VIN码]", "vin")
            .with_field("[品牌]", "make")
            .with_field("[车型]", "model")
            .with_field("[发动机型号]", "engine.engine_code")
            .with_field("[排量]", "engine.displacement")
            .with_field("[排放标准]", "emission.emission_standard")
            .with_field("[CO2排放]", "emission.co2_emission")
            .with_field("[油耗]", "emission.fuel_consumption")
            .with_field("[测试日期]", "emission.test_date")
            .with_field("[检测员]", "inspector"),
        TemplateConfig::new("vehicle_basic_info")
            .with_template_file("vehicle_basic_template.docx")
            .with_field("[VIN码]", "vin")
            .with_field("[品牌]", "make")
            .with_field("[车型]", "model")
            .with_field("[年份]", "year")
            .with_field("[生产日期]", "production_date")
            .with_field("[发动机型号]", "engine.engine_code")
            .with_field("[变速箱型号]", "transmission.transmission_code"),
    ]
}

// ==========================================
// TemplateRegistry - 进程级模板注册表
// ==========================================
#[derive(Debug)]
pub struct TemplateRegistry {
    current: RwLock<Arc<TemplateTable>>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::with_templates(builtin_templates())
    }
}

impl TemplateRegistry {
    /// 空注册表（不含内置模板）
    pub fn empty() -> Self {
        Self::with_templates(Vec::new())
    }

    fn with_templates(templates: Vec<TemplateConfig>) -> Self {
        let table = templates
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect::<TemplateTable>();
        Self {
            current: RwLock::new(Arc::new(table)),
        }
    }

    pub fn snapshot(&self) -> ConfigResult<Arc<TemplateTable>> {
        let guard = self
            .current
            .read()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;
        Ok(Arc::clone(&guard))
    }

    /// 按名称查找（不存在返回 TemplateNotFound）
    pub fn get(&self, name: &str) -> ConfigResult<TemplateConfig> {
        self.snapshot()?
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::TemplateNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot()
            .map(|table| table.contains_key(name))
            .unwrap_or(false)
    }

    pub fn names(&self) -> ConfigResult<Vec<String>> {
        Ok(self.snapshot()?.keys().cloned().collect())
    }

    /// 注册或覆盖模板（唯一更新入口）
    pub fn register(&self, template: TemplateConfig) -> ConfigResult<()> {
        template.validate()?;
        let mut guard = self
            .current
            .write()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;
        let mut next = TemplateTable::clone(&guard);
        let name = template.name.clone();
        let fields = template.fields.len();
        next.insert(name.clone(), template);
        *guard = Arc::new(next);
        info!(template = %name, fields, "模板已注册");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_registered() {
        let registry = TemplateRegistry::default();
        let names = registry.names().unwrap();
        assert!(names.contains(&"vehicle_basic_info".to_string()));
        assert!(names.contains(&"vehicle_emission_report".to_string()));
        for t in builtin_templates() {
            t.validate().unwrap();
        }
    }

    #[test]
    fn test_unknown_template_is_not_found() {
        let registry = TemplateRegistry::default();
        assert!(matches!(
            registry.get("nope"),
            Err(ConfigError::TemplateNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_register_rejects_empty_path_segment() {
        let registry = TemplateRegistry::empty();
        let bad = TemplateConfig::new("bad").with_field("[x]", "engine..torque");
        assert!(matches!(
            registry.register(bad),
            Err(ConfigError::InvalidTemplate { .. })
        ));
        assert!(!registry.contains("bad"));
    }

    #[test]
    fn test_register_rejects_names_that_leave_template_dir() {
        let registry = TemplateRegistry::empty();
        for name in ["../escape", "sub/inner", "a\\b", ".."] {
            assert!(matches!(
                registry.register(TemplateConfig::new(name)),
                Err(ConfigError::InvalidTemplate { .. })
            ));
        }
        let bad_file = TemplateConfig::new("ok").with_template_file("../ok.docx");
        assert!(registry.register(bad_file).is_err());
        assert!(registry.names().unwrap().is_empty());
    }

    #[test]
    fn test_register_preserves_field_order() {
        let registry = TemplateRegistry::empty();
        registry
            .register(
                TemplateConfig::new("custom")
                    .with_field("[b]", "b")
                    .with_field("[a]", "a"),
            )
            .unwrap();
        let template = registry.get("custom").unwrap();
        let keys: Vec<_> = template.fields.keys().cloned().collect();
        assert_eq!(keys, vec!["[b]", "[a]"]);
    }
}

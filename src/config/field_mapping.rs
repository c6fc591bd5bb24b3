// ==========================================
// 汽车数据处理工具 - 字段映射配置
// ==========================================
// 职责: 类别 → {工作表名匹配模式, 标准字段 → 有序别名列表}
// 红线: 类别顺序与别名顺序有意义（首个命中生效）
// 并发: 注册表持有不可变快照，更新时整体替换（写时复制），
//       结构化过程中读者拿到的快照不会被改写
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

// ==========================================
// CategoryMapping - 单个类别的映射规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryMapping {
    /// 工作表名匹配模式（不区分大小写的子串匹配）
    pub sheet_patterns: Vec<String>,
    /// 标准字段 → 有序别名
    #[serde(alias = "field_mappings")]
    pub field_aliases: IndexMap<String, Vec<String>>,
}

impl CategoryMapping {
    pub fn new<P, F, A>(patterns: P, fields: F) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        F: IntoIterator<Item = (&'static str, A)>,
        A: IntoIterator<Item = &'static str>,
    {
        Self {
            sheet_patterns: patterns.into_iter().map(Into::into).collect(),
            field_aliases: fields
                .into_iter()
                .map(|(field, aliases)| {
                    (
                        field.to_string(),
                        aliases.into_iter().map(str::to_string).collect(),
                    )
                })
                .collect(),
        }
    }

    /// 工作表名是否命中本类别
    pub fn matches_sheet(&self, sheet_name: &str) -> bool {
        let lowered = sheet_name.to_lowercase();
        self.sheet_patterns
            .iter()
            .any(|p| lowered.contains(&p.to_lowercase()))
    }

    /// 所有别名（去重前，按配置顺序）
    pub fn all_aliases(&self) -> impl Iterator<Item = &str> {
        self.field_aliases
            .values()
            .flat_map(|aliases| aliases.iter().map(String::as_str))
    }

    fn validate(&self, category: &str) -> ConfigResult<()> {
        let invalid = |message: &str| ConfigError::InvalidMapping {
            category: category.to_string(),
            message: message.to_string(),
        };

        if self
            .sheet_patterns
            .iter()
            .all(|p| p.trim().is_empty())
        {
            return Err(invalid("sheet_patterns 不能为空"));
        }
        if self.field_aliases.is_empty() {
            return Err(invalid("field_aliases 不能为空"));
        }
        for (field, aliases) in &self.field_aliases {
            if field.trim().is_empty() {
                return Err(invalid("标准字段名不能为空"));
            }
            if aliases.iter().all(|a| a.trim().is_empty()) {
                return Err(ConfigError::InvalidMapping {
                    category: category.to_string(),
                    message: format!("字段 {} 没有任何别名", field),
                });
            }
        }
        Ok(())
    }
}

// ==========================================
// FieldMappingConfig - 全部类别（有序）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMappingConfig {
    categories: IndexMap<String, CategoryMapping>,
}

impl Default for FieldMappingConfig {
    fn default() -> Self {
        let mut categories = IndexMap::new();
        categories.insert(
            "vehicle_info".to_string(),
            CategoryMapping::new(
                ["车辆信息", "基本信息", "Vehicle Info", "基本信息表"],
                [
                    ("VIN", vec!["VIN码", "车辆识别码", "VIN", "车架号"]),
                    ("make", vec!["品牌", "制造商", "Make", "厂牌"]),
                    ("model", vec!["车型", "型号", "Model", "车辆型号"]),
                    ("year", vec!["年份", "Year", "生产年份", "年款"]),
                    ("production_date", vec!["生产日期", "Production Date", "制造日期"]),
                ],
            ),
        );
        categories.insert(
            "engine_info".to_string(),
            CategoryMapping::new(
                ["发动机信息", "Engine Info", "发动机参数"],
                [
                    ("VIN", vec!["VIN码", "车辆识别码", "VIN", "车架号"]),
                    ("engine_code", vec!["发动机型号", "Engine Code", "发动机代码"]),
                    ("displacement", vec!["排量", "Displacement", "排气量"]),
                    ("power", vec!["功率", "Power", "额定功率"]),
                    ("torque", vec!["扭矩", "Torque", "最大扭矩"]),
                    ("fuel_type", vec!["燃料类型", "Fuel Type", "燃油类型"]),
                ],
            ),
        );
        categories.insert(
            "emission_info".to_string(),
            CategoryMapping::new(
                ["排放信息", "Emission Info", "排放参数"],
                [
                    ("VIN", vec!["VIN码", "车辆识别码", "VIN", "车架号"]),
                    ("emission_standard", vec!["排放标准", "Emission Standard", "环保标准"]),
                    ("co2_emission", vec!["CO2排放", "CO2 Emission", "二氧化碳排放"]),
                    ("fuel_consumption", vec!["油耗", "Fuel Consumption", "燃油消耗量"]),
                    ("test_date", vec!["测试日期", "Test Date", "检测日期"]),
                ],
            ),
        );
        categories.insert(
            "transmission_info".to_string(),
            CategoryMapping::new(
                ["变速箱信息", "Transmission Info", "变速箱参数"],
                [
                    ("VIN", vec!["VIN码", "车辆识别码", "VIN", "车架号"]),
                    ("transmission_code", vec!["变速箱型号", "Transmission Code", "变速器型号"]),
                    ("transmission_type", vec!["变速箱类型", "Transmission Type", "变速器类型"]),
                    ("gear_count", vec!["档位数", "Gears", "挡位数"]),
                    ("drive_type", vec!["驱动方式", "Drive Type", "驱动形式"]),
                ],
            ),
        );
        Self { categories }
    }
}

impl FieldMappingConfig {
    /// 空配置（不含任何类别）
    pub fn empty() -> Self {
        Self {
            categories: IndexMap::new(),
        }
    }

    /// 从 JSON 文本解析并校验
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: FieldMappingConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 加载时校验：拒绝形状不合法的配置，避免在查找时才失败
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, mapping) in &self.categories {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidMapping {
                    category: name.clone(),
                    message: "类别名不能为空".to_string(),
                });
            }
            mapping.validate(name)?;
        }
        Ok(())
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &CategoryMapping)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    pub fn category(&self, name: &str) -> ConfigResult<&CategoryMapping> {
        self.categories
            .get(name)
            .ok_or_else(|| ConfigError::CategoryNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// 按配置顺序返回所有命中该工作表名的类别
    pub fn matching_categories(&self, sheet_name: &str) -> Vec<String> {
        self.categories
            .iter()
            .filter(|(_, mapping)| mapping.matches_sheet(sheet_name))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// 新增或整体替换一个类别（替换时保持原位置）
    pub fn set_category(&mut self, name: &str, mapping: CategoryMapping) -> ConfigResult<()> {
        mapping.validate(name)?;
        self.categories.insert(name.to_string(), mapping);
        Ok(())
    }

    /// 合并另一份配置：同名类别整体替换，新类别追加在末尾，其余保留
    pub fn merge(&mut self, other: FieldMappingConfig) {
        for (name, mapping) in other.categories {
            self.categories.insert(name, mapping);
        }
    }
}

// ==========================================
// FieldMappingRegistry - 进程级映射注册表
// ==========================================
#[derive(Debug)]
pub struct FieldMappingRegistry {
    current: RwLock<Arc<FieldMappingConfig>>,
}

impl Default for FieldMappingRegistry {
    fn default() -> Self {
        Self::new(FieldMappingConfig::default())
    }
}

impl FieldMappingRegistry {
    pub fn new(config: FieldMappingConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// 当前只读快照（一次结构化过程全程持有同一快照）
    pub fn snapshot(&self) -> ConfigResult<Arc<FieldMappingConfig>> {
        let guard = self
            .current
            .read()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;
        Ok(Arc::clone(&guard))
    }

    /// 唯一更新入口：基于当前快照复制、修改、校验后整体发布
    pub fn update<F>(&self, apply: F) -> ConfigResult<Arc<FieldMappingConfig>>
    where
        F: FnOnce(&mut FieldMappingConfig) -> ConfigResult<()>,
    {
        let mut guard = self
            .current
            .write()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;
        let mut next = FieldMappingConfig::clone(&guard);
        apply(&mut next)?;
        next.validate()?;
        let published = Arc::new(next);
        *guard = Arc::clone(&published);
        Ok(published)
    }

    /// 合并一份配置（同名类别替换）
    pub fn configure(&self, config: FieldMappingConfig) -> ConfigResult<()> {
        config.validate()?;
        let count = config.len();
        self.update(move |current| {
            current.merge(config);
            Ok(())
        })?;
        info!(categories = count, "字段映射规则已更新");
        Ok(())
    }

    /// 从 JSON 文件加载并合并到当前配置
    pub fn load_file(&self, path: &Path) -> ConfigResult<()> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::FileError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let loaded = FieldMappingConfig::from_json_str(&raw)?;
        self.configure(loaded)?;
        info!(path = %path.display(), "字段映射配置已从文件加载");
        Ok(())
    }

    /// 将当前快照保存为 JSON 文件
    pub fn save_file(&self, path: &Path) -> ConfigResult<()> {
        let json = self.snapshot()?.to_json_pretty()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::FileError {
                path: parent.display().to_string(),
                message: e.to_string(),
            })?;
        }
        std::fs::write(path, json).map_err(|e| ConfigError::FileError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        info!(path = %path.display(), "字段映射配置已保存");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_category_order() {
        let config = FieldMappingConfig::default();
        assert_eq!(
            config.category_names(),
            vec!["vehicle_info", "engine_info", "emission_info", "transmission_info"]
        );
    }

    #[test]
    fn test_sheet_match_is_case_insensitive_substring() {
        let config = FieldMappingConfig::default();
        assert_eq!(config.matching_categories("2024 ENGINE INFO 汇总"), vec!["engine_info"]);
        assert!(config.matching_categories("Sheet1").is_empty());
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let raw = r#"{"x": {"sheet_patterns": ["a"], "field_aliases": {"f": ["A"]}, "extra": 1}}"#;
        assert!(matches!(
            FieldMappingConfig::from_json_str(raw),
            Err(ConfigError::JsonError(_))
        ));
    }

    #[test]
    fn test_load_rejects_field_without_aliases() {
        let raw = r#"{"x": {"sheet_patterns": ["a"], "field_aliases": {"f": []}}}"#;
        assert!(matches!(
            FieldMappingConfig::from_json_str(raw),
            Err(ConfigError::InvalidMapping { .. })
        ));
    }

    #[test]
    fn test_load_accepts_legacy_field_mappings_key() {
        let raw = r#"{"x": {"sheet_patterns": ["a"], "field_mappings": {"f": ["A"]}}}"#;
        let config = FieldMappingConfig::from_json_str(raw).unwrap();
        assert_eq!(config.category("x").unwrap().field_aliases["f"], vec!["A"]);
    }

    #[test]
    fn test_registry_merge_keeps_old_snapshot_intact() {
        let registry = FieldMappingRegistry::default();
        let before = registry.snapshot().unwrap();

        let extra = FieldMappingConfig::from_json_str(
            r#"{"chassis_info": {"sheet_patterns": ["底盘"], "field_aliases": {"axle": ["轴距"]}}}"#,
        )
        .unwrap();
        registry.configure(extra).unwrap();

        let after = registry.snapshot().unwrap();
        assert_eq!(before.len(), 4);
        assert_eq!(after.len(), 5);
        assert_eq!(after.category_names().last().unwrap(), "chassis_info");
    }

    #[test]
    fn test_registry_update_failure_publishes_nothing() {
        let registry = FieldMappingRegistry::default();
        let result = registry.update(|cfg| {
            cfg.merge(FieldMappingConfig {
                categories: IndexMap::from([(
                    "bad".to_string(),
                    CategoryMapping {
                        sheet_patterns: vec![],
                        field_aliases: IndexMap::new(),
                    },
                )]),
            });
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(registry.snapshot().unwrap().len(), 4);
    }

    #[test]
    fn test_save_then_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        FieldMappingRegistry::default().save_file(&path).unwrap();

        let registry = FieldMappingRegistry::new(FieldMappingConfig::empty());
        registry.load_file(&path).unwrap();
        assert_eq!(*registry.snapshot().unwrap(), FieldMappingConfig::default());
    }
}

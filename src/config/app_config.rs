// ==========================================
// 汽车数据处理工具 - 应用路径配置
// ==========================================
// 职责: 数据库 / 模板目录 / 映射配置 / 输出目录的路径解析
// 优先级: 环境变量 > 用户数据目录 > 当前目录
// ==========================================

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "CAR_DATA_DB_PATH";
pub const ENV_TEMPLATE_DIR: &str = "CAR_DATA_TEMPLATE_DIR";
pub const ENV_MAPPING_PATH: &str = "CAR_DATA_MAPPING_PATH";
pub const ENV_OUTPUT_DIR: &str = "CAR_DATA_OUTPUT_DIR";

const DB_FILE_NAME: &str = "car_data.db";
const MAPPING_FILE_NAME: &str = "field_mapping.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub template_dir: PathBuf,
    pub mapping_config_path: PathBuf,
    pub output_dir: PathBuf,
}

impl AppConfig {
    /// 按环境变量与默认目录解析
    pub fn from_env() -> Self {
        let base = default_data_dir();
        Self {
            db_path: env_path(ENV_DB_PATH).unwrap_or_else(|| base.join(DB_FILE_NAME)),
            template_dir: env_path(ENV_TEMPLATE_DIR).unwrap_or_else(|| base.join("templates")),
            mapping_config_path: env_path(ENV_MAPPING_PATH)
                .unwrap_or_else(|| base.join(MAPPING_FILE_NAME)),
            output_dir: env_path(ENV_OUTPUT_DIR).unwrap_or_else(|| base.join("output")),
        }
    }

    /// 全部路径落在同一根目录下（测试 / 便携模式）
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            db_path: root.join(DB_FILE_NAME),
            template_dir: root.join("templates"),
            mapping_config_path: root.join(MAPPING_FILE_NAME),
            output_dir: root.join("output"),
        }
    }

    /// 创建模板目录与输出目录（数据库目录由 SQLite 打开前创建）
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.template_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// 默认数据根目录
fn default_data_dir() -> PathBuf {
    match dirs::data_dir() {
        Some(data_dir) => {
            // 开发环境使用独立目录，避免污染正式数据
            #[cfg(debug_assertions)]
            {
                data_dir.join("car-data-processor-dev")
            }

            #[cfg(not(debug_assertions))]
            {
                data_dir.join("car-data-processor")
            }
        }
        None => PathBuf::from("."),
    }
}

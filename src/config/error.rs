// ==========================================
// 汽车数据处理工具 - 配置层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 配置错误视为编程/配置缺陷，同步抛给调用方
// ==========================================

use thiserror::Error;

/// 配置层错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    // ===== 查找错误 =====
    #[error("模板不存在: {0}")]
    TemplateNotFound(String),

    #[error("映射类别不存在: {0}")]
    CategoryNotFound(String),

    // ===== 加载校验错误 =====
    #[error("字段映射配置无效 (类别 {category}): {message}")]
    InvalidMapping { category: String, message: String },

    #[error("模板配置无效 (模板 {template}): {message}")]
    InvalidTemplate { template: String, message: String },

    // ===== 文件错误 =====
    #[error("配置文件读写失败 ({path}): {message}")]
    FileError { path: String, message: String },

    #[error("配置 JSON 解析失败: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("配置锁获取失败: {0}")]
    LockError(String),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;

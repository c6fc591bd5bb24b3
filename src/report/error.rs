// ==========================================
// 汽车数据处理工具 - 报告模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 能力缺失不是异常，分发层将 RenderUnavailable 转为 RenderOutcome::Unavailable
// ==========================================

use crate::config::ConfigError;
use crate::domain::OutputKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    // ===== 调用方错误 =====
    #[error("不支持的输出格式: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    // ===== 渲染错误 =====
    #[error("渲染能力不可用: {0}")]
    RenderUnavailable(OutputKind),

    #[error("渲染失败 ({kind}): {message}")]
    RenderError { kind: OutputKind, message: String },

    #[error("文件读写失败: {0}")]
    IoError(String),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReportError {
    pub fn render(kind: OutputKind, err: impl std::fmt::Display) -> Self {
        ReportError::RenderError {
            kind,
            message: err.to_string(),
        }
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::IoError(err.to_string())
    }
}

/// Result 类型别名
pub type ReportResult<T> = Result<T, ReportError>;

// ==========================================
// 汽车数据处理工具 - 应用层
// ==========================================
// 职责: 组装共享状态，连接命令行与后端
// ==========================================

pub mod state;

// 重导出
pub use state::AppState;

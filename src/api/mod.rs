// ==========================================
// 批量导入作业引擎 - API 层
// ==========================================
// 职责: 提供作业 API 接口,供调用方（CLI / 服务）使用
// ==========================================

pub mod error;
pub mod import_job_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_job_api::{ImportJobApi, SqlitePipeline};

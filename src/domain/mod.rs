// ==========================================
// 批量导入作业引擎 - 领域模型层
// ==========================================
// 职责: 定义作业实体、行记录、状态类型
// 红线: 不含数据访问逻辑,不含流水线逻辑
// ==========================================

pub mod job;
pub mod record;
pub mod types;

// 重导出核心类型
pub use job::{ImportJob, JobErrors};
pub use record::{FieldErrors, NormalizedRecord, RawRow, Record, RecordOutcome};
pub use types::{ImportJobStatus, JobVariant};

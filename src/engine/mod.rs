// ==========================================
// 批量导入作业引擎 - 引擎层
// ==========================================
// 职责: 作业状态机 + 导入流水线编排
// 红线: Engine 不拼 SQL，所有持久化经 Repository
// ==========================================

pub mod error;
pub mod job_locks;
pub mod pipeline;
pub mod state_machine;

// 重导出核心引擎
pub use error::{error_trace, JobError, JobResult};
pub use job_locks::JobLocks;
pub use pipeline::{ImportPipeline, ProcessOutcome, ProcessReport, SaveReport};
pub use state_machine::{apply_transition, InvalidTransitionError, Transition};

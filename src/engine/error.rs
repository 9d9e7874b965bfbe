// ==========================================
// 批量导入作业引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 校验失败是数据，不是错误；此处只有基础设施与调用错误
// ==========================================

use crate::engine::state_machine::InvalidTransitionError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransitionError),

    #[error("文件解码失败")]
    Decode(#[source] ImportError),

    #[error("目标存储写入失败")]
    Storage(#[source] RepositoryError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("作业不存在: {0}")]
    JobNotFound(String),

    #[error("作业未超时: job_id={job_id}, idle_secs={idle_secs}, threshold_secs={threshold_secs}")]
    NotStale {
        job_id: String,
        idle_secs: i64,
        threshold_secs: i64,
    },

    #[error("作业配置错误: {0}")]
    Config(String),
}

/// Result 类型别名
pub type JobResult<T> = Result<T, JobError>;

/// 错误链文本：自身描述 + 逐级 source
pub fn error_trace(err: &(dyn std::error::Error + 'static)) -> String {
    let mut trace = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        trace.push_str("\ncaused by: ");
        trace.push_str(&cause.to_string());
        source = cause.source();
    }
    trace
}

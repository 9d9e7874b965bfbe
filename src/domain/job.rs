// ==========================================
// 批量导入作业引擎 - 导入作业实体
// ==========================================
// 职责: ImportJob 实体定义（持久化）
// 红线: 实体字段只能通过状态机转换修改（见 engine::state_machine）
// ==========================================

use crate::domain::record::NormalizedRecord;
use crate::domain::types::{ImportJobStatus, JobVariant};
use crate::importer::error_report::ErrorReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// JobErrors - 作业错误载荷
// ==========================================
// Validation: 行级校验错误表（落 errors 列，JSON）
// Exception:  捕获的异常链（落 exceptions 列，文本）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JobErrors {
    Validation(ErrorReport),
    Exception(String),
}

impl JobErrors {
    pub fn validation_report(&self) -> Option<&ErrorReport> {
        match self {
            JobErrors::Validation(report) => Some(report),
            JobErrors::Exception(_) => None,
        }
    }

    pub fn exception_trace(&self) -> Option<&str> {
        match self {
            JobErrors::Validation(_) => None,
            JobErrors::Exception(trace) => Some(trace.as_str()),
        }
    }
}

// ==========================================
// ImportJob - 导入作业
// ==========================================
// 对齐: import_job 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: String,                                  // 作业 ID（UUID）
    pub job_type: String,                            // 作业类型（对应配置）
    pub variant: JobVariant,                         // 状态图变体
    pub status: ImportJobStatus,                     // 当前状态
    pub created_on: DateTime<Utc>,                   // 创建时间
    pub started_on: Option<DateTime<Utc>>,           // 开始时间
    pub completed_on: Option<DateTime<Utc>>,         // 完成时间
    pub last_status_update: Option<DateTime<Utc>>,   // 最近状态变更时间
    pub source_file: String,                         // 源文件引用（不持有文件内容）
    pub data: Option<Vec<NormalizedRecord>>,         // 规范化数据
    pub errors: Option<JobErrors>,                   // 错误载荷
}

impl ImportJob {
    /// 创建新作业（未落库，状态 not_started）
    pub fn new(source_file: impl Into<String>, job_type: impl Into<String>, variant: JobVariant) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_type: job_type.into(),
            variant,
            status: ImportJobStatus::NotStarted,
            created_on: Utc::now(),
            started_on: None,
            completed_on: None,
            last_status_update: None,
            source_file: source_file.into(),
            data: None,
            errors: None,
        }
    }

    /// 是否没有记录任何错误
    pub fn is_valid(&self) -> bool {
        self.errors.is_none()
    }

    /// 行级错误报告（仅校验失败时存在）
    pub fn error_report(&self) -> Option<&ErrorReport> {
        self.errors.as_ref().and_then(|e| e.validation_report())
    }

    /// 异常链（仅基础设施失败时存在）
    pub fn exceptions(&self) -> Option<&str> {
        self.errors.as_ref().and_then(|e| e.exception_trace())
    }

    /// 距最近一次状态变更的时长；从未变更时以创建时间计
    pub fn staleness(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_status_update.unwrap_or(self.created_on)
    }
}

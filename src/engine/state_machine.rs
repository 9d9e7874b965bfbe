// ==========================================
// 批量导入作业引擎 - 作业状态机
// ==========================================
// 职责: 表驱动的状态转换（纯函数，不做 I/O）
// 红线: 守卫失败时不产生任何修改；持久化由流水线负责
// ==========================================
//
// 转换表（来源状态）:
//
// | 转换              | 目标           | simple               | two_phase                                      |
// |-------------------|----------------|----------------------|------------------------------------------------|
// | Start             | started        | not_started, errors  | not_started, errors, file_errors, file_processed |
// | MarkFileProcessed | file_processed | -                    | started                                        |
// | MarkFileErrors    | file_errors    | -                    | started                                        |
// | MarkSuccess       | success        | started              | file_processed                                 |
// | MarkErrors        | errors         | not_started, started | not_started, started, file_processed           |

use crate::domain::job::{ImportJob, JobErrors};
use crate::domain::record::NormalizedRecord;
use crate::domain::types::{ImportJobStatus, JobVariant};
use crate::importer::error_report::ErrorReport;
use chrono::{DateTime, Utc};
use thiserror::Error;

use ImportJobStatus::*;

// ==========================================
// InvalidTransitionError
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("非法状态转换: job_id={job_id}, from={from}, to={to}")]
pub struct InvalidTransitionError {
    pub job_id: String,
    pub from: ImportJobStatus,
    pub to: ImportJobStatus,
}

// ==========================================
// Transition - 状态转换（携带载荷）
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Start,
    MarkFileProcessed { data: Vec<NormalizedRecord> },
    MarkFileErrors { report: ErrorReport },
    MarkSuccess { data: Option<Vec<NormalizedRecord>> },
    MarkErrors { errors: JobErrors },
}

impl Transition {
    /// 转换目标状态
    pub fn target(&self) -> ImportJobStatus {
        match self {
            Transition::Start => Started,
            Transition::MarkFileProcessed { .. } => FileProcessed,
            Transition::MarkFileErrors { .. } => FileErrors,
            Transition::MarkSuccess { .. } => Success,
            Transition::MarkErrors { .. } => Errors,
        }
    }

    /// 指定变体下允许的来源状态
    pub fn allowed_sources(&self, variant: JobVariant) -> &'static [ImportJobStatus] {
        match (self, variant) {
            (Transition::Start, JobVariant::Simple) => &[NotStarted, Errors],
            (Transition::Start, JobVariant::TwoPhase) => {
                &[NotStarted, Errors, FileErrors, FileProcessed]
            }
            (Transition::MarkFileProcessed { .. }, JobVariant::Simple) => &[],
            (Transition::MarkFileProcessed { .. }, JobVariant::TwoPhase) => &[Started],
            (Transition::MarkFileErrors { .. }, JobVariant::Simple) => &[],
            (Transition::MarkFileErrors { .. }, JobVariant::TwoPhase) => &[Started],
            (Transition::MarkSuccess { .. }, JobVariant::Simple) => &[Started],
            (Transition::MarkSuccess { .. }, JobVariant::TwoPhase) => &[FileProcessed],
            (Transition::MarkErrors { .. }, JobVariant::Simple) => &[NotStarted, Started],
            (Transition::MarkErrors { .. }, JobVariant::TwoPhase) => {
                &[NotStarted, Started, FileProcessed]
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::MarkFileProcessed { .. } => "mark_file_processed",
            Transition::MarkFileErrors { .. } => "mark_file_errors",
            Transition::MarkSuccess { .. } => "mark_success",
            Transition::MarkErrors { .. } => "mark_errors",
        }
    }
}

/// 作业已记录的最晚时间戳
fn latest_timestamp(job: &ImportJob) -> DateTime<Utc> {
    [job.started_on, job.completed_on, job.last_status_update]
        .into_iter()
        .flatten()
        .fold(job.created_on, |acc, t| acc.max(t))
}

/// 应用状态转换
///
/// # 参数
/// - job: 当前作业（不会被修改）
/// - variant: 状态图变体
/// - transition: 转换及其载荷
/// - now: 当前时间；早于已有时间戳时取已有时间戳，保证单调
///
/// # 返回
/// - Ok(ImportJob): 转换后的新作业
/// - Err(InvalidTransitionError): 来源状态不在转换表中，或 success 时没有数据
pub fn apply_transition(
    job: &ImportJob,
    variant: JobVariant,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<ImportJob, InvalidTransitionError> {
    let target = transition.target();
    if !transition.allowed_sources(variant).contains(&job.status) {
        return Err(InvalidTransitionError {
            job_id: job.id.clone(),
            from: job.status,
            to: target,
        });
    }

    let stamp = now.max(latest_timestamp(job));
    let mut next = job.clone();
    next.status = target;
    next.last_status_update = Some(stamp);

    match transition {
        Transition::Start => {
            next.started_on = Some(stamp);
            next.completed_on = None;
            next.data = None;
            next.errors = None;
        }
        Transition::MarkFileProcessed { data } => {
            next.data = Some(data);
            next.errors = None;
        }
        Transition::MarkFileErrors { report } => {
            next.data = None;
            next.errors = Some(JobErrors::Validation(report));
            next.completed_on = Some(stamp);
        }
        Transition::MarkSuccess { data } => {
            if let Some(data) = data {
                next.data = Some(data);
            }
            next.errors = None;
            next.completed_on = Some(stamp);
        }
        Transition::MarkErrors { errors } => {
            next.data = None;
            next.errors = Some(errors);
            next.completed_on = Some(stamp);
        }
    }

    // success 必须携带已校验数据（simple 由载荷提供，two_phase 沿用 file_processed 的数据）
    if next.status == Success && next.data.is_none() {
        return Err(InvalidTransitionError {
            job_id: job.id.clone(),
            from: job.status,
            to: target,
        });
    }

    Ok(next)
}

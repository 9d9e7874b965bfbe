// ==========================================
// 批量导入作业引擎 - 领域类型定义
// ==========================================
// 职责: 作业状态、作业变体等枚举
// 持久化: 状态以整数存储（与 import_job.status 列一致）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 导入作业状态 (Import Job Status)
// ==========================================
// 数值编码固定，不可随意调整（已落库）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportJobStatus {
    NotStarted,    // 已创建，未开始
    Started,       // 执行中
    FileProcessed, // 文件已解析并校验通过（两阶段变体）
    FileErrors,    // 文件数据校验失败（两阶段变体）
    Success,       // 成功完成
    Errors,        // 失败（异常或简单变体下的校验失败）
}

impl ImportJobStatus {
    pub const ALL: [ImportJobStatus; 6] = [
        ImportJobStatus::NotStarted,
        ImportJobStatus::Started,
        ImportJobStatus::FileProcessed,
        ImportJobStatus::FileErrors,
        ImportJobStatus::Success,
        ImportJobStatus::Errors,
    ];

    /// 落库用整数编码
    pub fn to_db_code(&self) -> i64 {
        match self {
            ImportJobStatus::NotStarted => 0,
            ImportJobStatus::Started => 20,
            ImportJobStatus::FileProcessed => 40,
            ImportJobStatus::FileErrors => 41,
            ImportJobStatus::Success => 100,
            ImportJobStatus::Errors => 101,
        }
    }

    /// 从整数编码解析；未知编码返回 None
    pub fn from_db_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.to_db_code() == code)
    }

    /// 是否已写入 completed_on
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            ImportJobStatus::Success | ImportJobStatus::Errors | ImportJobStatus::FileErrors
        )
    }

    /// 终态: 不会被隐式触发重新执行
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportJobStatus::Success | ImportJobStatus::Errors)
    }

    /// 处于执行中（看门狗关注的状态）
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ImportJobStatus::Started | ImportJobStatus::FileProcessed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportJobStatus::NotStarted => "not_started",
            ImportJobStatus::Started => "started",
            ImportJobStatus::FileProcessed => "file_processed",
            ImportJobStatus::FileErrors => "file_errors",
            ImportJobStatus::Success => "success",
            ImportJobStatus::Errors => "errors",
        }
    }
}

impl fmt::Display for ImportJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 作业变体 (Job Variant)
// ==========================================
// Simple:   not_started → started → success | errors
// TwoPhase: not_started → started → file_processed → success | errors
//                                  → file_errors
//                                  → errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobVariant {
    #[default]
    Simple,
    TwoPhase,
}

impl JobVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobVariant::Simple => "simple",
            JobVariant::TwoPhase => "two_phase",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Some(JobVariant::Simple),
            "two_phase" | "two-phase" | "twophase" => Some(JobVariant::TwoPhase),
            _ => None,
        }
    }
}

impl fmt::Display for JobVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_db_code_roundtrip() {
        for status in ImportJobStatus::ALL {
            assert_eq!(ImportJobStatus::from_db_code(status.to_db_code()), Some(status));
        }
        assert_eq!(ImportJobStatus::from_db_code(7), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ImportJobStatus::Success.is_terminal());
        assert!(ImportJobStatus::Errors.is_terminal());
        assert!(!ImportJobStatus::FileErrors.is_terminal());
        assert!(ImportJobStatus::FileErrors.is_completed());
        assert!(!ImportJobStatus::Started.is_completed());
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!(JobVariant::from_str("two-phase"), Some(JobVariant::TwoPhase));
        assert_eq!(JobVariant::from_str(" Simple "), Some(JobVariant::Simple));
        assert_eq!(JobVariant::from_str("other"), None);
    }
}

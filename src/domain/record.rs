// ==========================================
// 批量导入作业引擎 - 行记录模型
// ==========================================
// 职责: 原始行、规范化记录、字段错误的类型定义
// 约束: 每条输入行校验后只对应一个结果（有效或无效）
// ==========================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// 原始行（列标签 → 原始文本）
pub type RawRow = HashMap<String, String>;

/// 规范化记录（字段 key → 类型化值）
pub type NormalizedRecord = serde_json::Map<String, Value>;

/// 字段错误（字段 key → 有序错误信息）
pub type FieldErrors = BTreeMap<String, Vec<String>>;

// ==========================================
// RecordOutcome - 单行校验结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RecordOutcome {
    Valid(NormalizedRecord),
    Invalid(FieldErrors),
}

// ==========================================
// Record - 单行记录（瞬态）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub row_index: usize,          // 解码序列中的位置（从 0 开始）
    pub raw_fields: RawRow,        // 原始字段（标签 → 原始值）
    pub outcome: RecordOutcome,    // 校验结果
}

impl Record {
    pub fn is_valid(&self) -> bool {
        matches!(self.outcome, RecordOutcome::Valid(_))
    }

    pub fn normalized(&self) -> Option<&NormalizedRecord> {
        match &self.outcome {
            RecordOutcome::Valid(record) => Some(record),
            RecordOutcome::Invalid(_) => None,
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match &self.outcome {
            RecordOutcome::Valid(_) => None,
            RecordOutcome::Invalid(errors) => Some(errors),
        }
    }
}

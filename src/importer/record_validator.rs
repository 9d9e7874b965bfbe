// ==========================================
// 批量导入作业引擎 - 记录校验器
// ==========================================
// 职责: 原始行 + Schema → 规范化记录 / 行级错误表
// 流程: 标签 → key 翻译（丢弃未知标签）→ Schema 单行校验 → 按行号汇总
// 约束: 每条输入行恰好产出一个结果，顺序与行号保持不变
// ==========================================

use crate::domain::record::{FieldErrors, NormalizedRecord, RawRow, Record, RecordOutcome};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::error_report::ErrorReport;
use crate::importer::schema::Schema;
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

pub struct RecordValidator {
    schema: Arc<Schema>,
    rows: Vec<RawRow>,
    keyed_rows: Vec<HashMap<String, String>>,
    records: OnceCell<Vec<Record>>,
    errors: OnceCell<BTreeMap<usize, FieldErrors>>,
    report: OnceCell<ErrorReport>,
}

impl RecordValidator {
    pub fn new(schema: Arc<Schema>, rows: Vec<RawRow>) -> Self {
        let keyed_rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|(label, value)| {
                        schema
                            .label_to_key(label)
                            .map(|key| (key.to_string(), value.clone()))
                    })
                    .collect()
            })
            .collect();

        Self {
            schema,
            rows,
            keyed_rows,
            records: OnceCell::new(),
            errors: OnceCell::new(),
            report: OnceCell::new(),
        }
    }

    /// 返回 Schema 不认识的表头（只用于提示，不阻断导入）
    pub fn check_extra_headers<I, S>(schema: &Schema, headers: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        headers
            .into_iter()
            .map(|h| h.as_ref().to_string())
            .filter(|h| schema.label_to_key(h).is_none())
            .collect()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// 逐行校验（惰性，只执行一次）
    pub fn records(&self) -> &[Record] {
        self.records.get_or_init(|| {
            let records: Vec<Record> = self
                .keyed_rows
                .iter()
                .zip(self.rows.iter())
                .enumerate()
                .map(|(row_index, (keyed, raw))| Record {
                    row_index,
                    raw_fields: raw.clone(),
                    outcome: match self.schema.validate_row(keyed) {
                        Ok(normalized) => RecordOutcome::Valid(normalized),
                        Err(field_errors) => RecordOutcome::Invalid(field_errors),
                    },
                })
                .collect();
            debug!(
                rows = records.len(),
                invalid = records.iter().filter(|r| !r.is_valid()).count(),
                "逐行校验完成"
            );
            records
        })
    }

    /// 行下标 → 字段错误
    pub fn errors(&self) -> &BTreeMap<usize, FieldErrors> {
        self.errors.get_or_init(|| {
            self.records()
                .iter()
                .filter_map(|r| r.field_errors().map(|e| (r.row_index, e.clone())))
                .collect()
        })
    }

    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }

    /// 所有有效行的规范化记录（按原始顺序）
    pub fn normalized_records(&self) -> Vec<NormalizedRecord> {
        self.records()
            .iter()
            .filter_map(|r| r.normalized().cloned())
            .collect()
    }

    /// 面向用户的错误报告（惰性，只构建一次）
    pub fn error_report(&self) -> &ErrorReport {
        self.report
            .get_or_init(|| ErrorReport::build(self.errors(), &self.schema))
    }

    /// 取出可落库的数据；存在校验错误时拒绝
    pub fn into_normalized(self) -> ImportResult<Vec<NormalizedRecord>> {
        let invalid_rows = self.errors().len();
        if invalid_rows > 0 {
            return Err(ImportError::InvalidData { invalid_rows });
        }
        Ok(self.normalized_records())
    }
}

// ==========================================
// 批量导入作业引擎 - 错误报告
// ==========================================
// 职责: 行级校验错误 → 面向用户的错误视图
// 规则: 显示行号 = row_index + 2（1 起始 + 表头行偏移）
//       字段 key → 原始列标签
// ==========================================

use crate::domain::record::FieldErrors;
use crate::importer::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 行号偏移：1 起始 + 1 行表头
pub const HEADER_ROW_OFFSET: usize = 2;

/// 数据行下标 → 源文件显示行号
pub fn display_row_number(row_index: usize) -> usize {
    row_index + HEADER_ROW_OFFSET
}

// ==========================================
// ErrorReport
// ==========================================
// 显示行号 → (列标签 → 有序错误信息)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorReport {
    rows: BTreeMap<usize, BTreeMap<String, Vec<String>>>,
}

impl ErrorReport {
    /// 由 row_index 索引的字段错误构建报告
    ///
    /// 无标签的 key 原样保留
    pub fn build(errors_by_row_index: &BTreeMap<usize, FieldErrors>, schema: &Schema) -> Self {
        let rows = errors_by_row_index
            .iter()
            .map(|(row_index, field_errors)| {
                let by_label = field_errors
                    .iter()
                    .map(|(key, messages)| {
                        let label = schema.key_to_label(key).unwrap_or(key.as_str());
                        (label.to_string(), messages.clone())
                    })
                    .collect();
                (display_row_number(*row_index), by_label)
            })
            .collect();

        Self { rows }
    }

    pub fn rows(&self) -> &BTreeMap<usize, BTreeMap<String, Vec<String>>> {
        &self.rows
    }

    /// 按显示行号查询
    pub fn row(&self, display_row: usize) -> Option<&BTreeMap<String, Vec<String>>> {
        self.rows.get(&display_row)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 出错行数
    pub fn invalid_row_count(&self) -> usize {
        self.rows.len()
    }

    /// 错误信息总数
    pub fn message_count(&self) -> usize {
        self.rows
            .values()
            .flat_map(|fields| fields.values())
            .map(Vec::len)
            .sum()
    }

    /// 单行文本摘要，用于日志
    pub fn summary_lines(&self) -> Vec<String> {
        self.rows
            .iter()
            .flat_map(|(row, fields)| {
                fields.iter().map(move |(label, messages)| {
                    format!("第 {} 行 [{}]: {}", row, label, messages.join("; "))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::schema::{FieldKind, Schema};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::builder()
            .field("name", "Name", FieldKind::Text)
            .field("age", "Age", FieldKind::Integer)
            .build()
            .unwrap()
    }

    #[test]
    fn test_rekeys_labels_and_offsets_rows() {
        let mut errors = BTreeMap::new();
        let mut row0 = FieldErrors::new();
        row0.insert("age".to_string(), vec!["not a number".to_string()]);
        errors.insert(0, row0);
        let mut row3 = FieldErrors::new();
        row3.insert("name".to_string(), vec!["This field is required.".to_string()]);
        errors.insert(3, row3);

        let report = ErrorReport::build(&errors, &schema());

        assert_eq!(report.invalid_row_count(), 2);
        assert_eq!(report.row(2).unwrap()["Age"], vec!["not a number".to_string()]);
        assert_eq!(
            report.row(5).unwrap()["Name"],
            vec!["This field is required.".to_string()]
        );
        assert!(report.row(0).is_none());
    }

    #[test]
    fn test_unknown_key_falls_back_to_key() {
        let mut errors = BTreeMap::new();
        let mut row = FieldErrors::new();
        row.insert("__all__".to_string(), vec!["row rejected".to_string()]);
        errors.insert(1, row);

        let report = ErrorReport::build(&errors, &schema());

        assert!(report.row(3).unwrap().contains_key("__all__"));
    }

    #[test]
    fn test_serializes_as_plain_mapping() {
        let mut errors = BTreeMap::new();
        let mut row = FieldErrors::new();
        row.insert("age".to_string(), vec!["not a number".to_string()]);
        errors.insert(0, row);

        let report = ErrorReport::build(&errors, &schema());
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value, json!({"2": {"Age": ["not a number"]}}));
        let back: ErrorReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
        assert_eq!(report.message_count(), 1);
    }
}

// ==========================================
// 批量导入作业引擎 - 导入层
// ==========================================
// 职责: 文件解码 → 逐行校验 → 错误报告
// 支持: Excel, CSV
// ==========================================

// 模块声明
pub mod error;
pub mod error_report;
pub mod file_parser;
pub mod import_trait;
pub mod record_validator;
pub mod schema;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use error_report::{display_row_number, ErrorReport, HEADER_ROW_OFFSET};
pub use file_parser::{CsvParser, ExcelParser, UniversalFileParser};
pub use record_validator::RecordValidator;
pub use schema::{
    FieldDefinition, FieldKind, FieldSpec, FieldValidatorFn, Schema, SchemaBuilder,
    SchemaDefinition,
};

// 重导出 Trait 接口
pub use import_trait::{DecodedFile, FileDecoder};

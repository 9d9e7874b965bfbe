// ==========================================
// 批量导入作业引擎 - 导入组件 Trait
// ==========================================
// 职责: 定义文件解码接口（不包含实现）
// ==========================================

use crate::domain::record::RawRow;
use crate::importer::error::ImportResult;
use std::path::Path;

// ==========================================
// DecodedFile - 解码结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFile {
    pub headers: Vec<String>, // 表头（按源文件顺序）
    pub rows: Vec<RawRow>,    // 数据行（按源文件顺序）
}

impl DecodedFile {
    pub fn new(headers: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// ==========================================
// FileDecoder Trait
// ==========================================
// 用途: 文件解码接口（流水线第 2 步）
// 实现者: CsvParser, ExcelParser, UniversalFileParser
pub trait FileDecoder: Send + Sync {
    /// 解码文件为有序的原始行记录
    ///
    /// # 参数
    /// - file_path: 文件路径
    ///
    /// # 返回
    /// - Ok(DecodedFile): 表头 + 行记录
    /// - Err: 文件不存在、格式错误、内容损坏
    fn decode(&self, file_path: &Path) -> ImportResult<DecodedFile>;
}

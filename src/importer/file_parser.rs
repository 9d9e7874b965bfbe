// ==========================================
// 批量导入作业引擎 - 文件解码器实现
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 约束: 数据行下标与源文件行号对齐（row_index + 2 = 源文件行号）
//       空白行以空 RawRow 占位
// ==========================================

use crate::domain::record::RawRow;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::import_trait::{DecodedFile, FileDecoder};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// 检查文件存在
fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

/// 按表头把一行单元格组装成 RawRow
fn zip_row<I>(headers: &[String], cells: I) -> RawRow
where
    I: IntoIterator<Item = String>,
{
    let mut row_map = RawRow::new();
    for (col_idx, value) in cells.into_iter().enumerate() {
        if let Some(header) = headers.get(col_idx) {
            if header.is_empty() {
                continue;
            }
            row_map.insert(header.clone(), value.trim().to_string());
        }
    }
    row_map
}

/// 表头固定在第 1 行，第 i 个数据行对应源文件第 i + 2 行
const FIRST_DATA_LINE: u64 = 2;

/// 用空行占位，使下一条记录的下标对应源文件行号
fn pad_to_line(rows: &mut Vec<RawRow>, line: u64) {
    while (rows.len() as u64) + FIRST_DATA_LINE < line {
        rows.push(RawRow::new());
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileDecoder for CsvParser {
    fn decode(&self, file_path: &Path) -> ImportResult<DecodedFile> {
        let path = file_path;
        ensure_exists(path)?;

        // 检查扩展名
        if let Some(ext) = path.extension() {
            if !ext.eq_ignore_ascii_case("csv") {
                return Err(ImportError::UnsupportedFormat(
                    ext.to_string_lossy().to_string(),
                ));
            }
        }

        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        // 读取表头
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        // 读取所有行；csv 读取器会跳过完全空的行，按记录起始行号补位
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            if let Some(position) = record.position() {
                pad_to_line(&mut rows, position.line());
            }
            rows.push(zip_row(&headers, record.iter().map(|v| v.to_string())));
        }

        debug!(file = %path.display(), rows = rows.len(), "CSV 解码完成");
        Ok(DecodedFile::new(headers, rows))
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileDecoder for ExcelParser {
    fn decode(&self, file_path: &Path) -> ImportResult<DecodedFile> {
        let path = file_path;
        ensure_exists(path)?;

        // 检查扩展名
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(path)?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        // 提取表头（第一行）
        let mut sheet_rows = range.rows();
        let header_row = sheet_rows
            .next()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无表头行".to_string()))?;

        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        // 表头之上的空行不在 range 内，补位后下标与工作表行号对齐
        let header_line = range.start().map(|(row, _)| u64::from(row) + 1).unwrap_or(1);
        let mut rows: Vec<RawRow> = Vec::new();
        pad_to_line(&mut rows, header_line + 1);
        rows.extend(
            sheet_rows.map(|data_row| zip_row(&headers, data_row.iter().map(|cell| cell.to_string()))),
        );

        debug!(file = %path.display(), sheet = %sheet_name, rows = rows.len(), "Excel 解码完成");
        Ok(DecodedFile::new(headers, rows))
    }
}

// ==========================================
// 通用文件解码器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileDecoder for UniversalFileParser {
    fn decode(&self, file_path: &Path) -> ImportResult<DecodedFile> {
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => CsvParser.decode(file_path),
            "xlsx" | "xls" => ExcelParser.decode(file_path),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、CSV 文件生成、Schema 等
// ==========================================
#![allow(dead_code)]

use bulk_import_engine::config::JobConfig;
use bulk_import_engine::db;
use bulk_import_engine::domain::JobVariant;
use bulk_import_engine::engine::ImportPipeline;
use bulk_import_engine::importer::{FieldKind, Schema};
use bulk_import_engine::repository::{ImportJobRepositoryImpl, SqliteRecordStore};
use rusqlite::Connection;
use std::error::Error;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub type TestPipeline = ImportPipeline<ImportJobRepositoryImpl, SqliteRecordStore>;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = Connection::open(&db_path)?;
    db::init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 写入临时 CSV 文件（首行为表头）
pub fn write_csv(lines: &[&str]) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}

pub fn path_of(file: &NamedTempFile) -> String {
    file.path().to_str().unwrap().to_string()
}

/// 测试 Schema: Name(文本) / Age(整数)，自然键 name
pub fn people_schema() -> Schema {
    Schema::builder()
        .field("name", "Name", FieldKind::Text)
        .field("age", "Age", FieldKind::Integer)
        .natural_key(["name"])
        .build()
        .unwrap()
}

pub fn people_config(variant: JobVariant) -> JobConfig {
    JobConfig::new("people").with_variant(variant)
}

/// 在同一连接上创建作业仓储与目标存储
pub fn open_shared(db_path: &str) -> (Arc<ImportJobRepositoryImpl>, Arc<SqliteRecordStore>) {
    let conn = Arc::new(Mutex::new(db::open_sqlite_connection(db_path).unwrap()));
    (
        Arc::new(ImportJobRepositoryImpl::from_connection(conn.clone())),
        Arc::new(SqliteRecordStore::from_connection(conn)),
    )
}

pub fn people_pipeline(db_path: &str, config: JobConfig) -> TestPipeline {
    let (jobs, store) = open_shared(db_path);
    ImportPipeline::new(jobs, store, Arc::new(people_schema()), config)
}

/// 通过触发器注入写入失败
pub fn install_failure_trigger(db_path: &str, name: &str, sql_condition: &str, table: &str, event: &str) {
    let conn = Connection::open(db_path).unwrap();
    conn.execute_batch(&format!(
        "CREATE TRIGGER {name} BEFORE {event} ON {table} WHEN {sql_condition} \
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;"
    ))
    .unwrap();
}

pub fn drop_trigger(db_path: &str, name: &str) {
    let conn = Connection::open(db_path).unwrap();
    conn.execute_batch(&format!("DROP TRIGGER IF EXISTS {name};")).unwrap();
}

/// 直接读取作业状态编码
pub fn raw_status(db_path: &str, job_id: &str) -> i64 {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row(
        "SELECT status FROM import_job WHERE id = ?1",
        [job_id],
        |row| row.get(0),
    )
    .unwrap()
}

/// 将作业最近状态变更时间回拨
pub fn backdate_job(db_path: &str, job_id: &str, seconds: i64) {
    let ts = (chrono::Utc::now() - chrono::Duration::seconds(seconds))
        .to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
    let conn = Connection::open(db_path).unwrap();
    conn.execute(
        "UPDATE import_job SET last_status_update = ?1, created_on = ?1 WHERE id = ?2",
        [ts.as_str(), job_id],
    )
    .unwrap();
}

// ==========================================
// 批量导入作业引擎 - 导入作业 Repository 实现
// ==========================================
// 职责: import_job 表 CRUD（使用 rusqlite）
// 并发控制: UPDATE ... WHERE id = ? AND status = <expected>
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::job::{ImportJob, JobErrors};
use crate::domain::record::NormalizedRecord;
use crate::domain::types::{ImportJobStatus, JobVariant};
use crate::importer::error_report::ErrorReport;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_job_repo::ImportJobRepository;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use tracing::debug;

const JOB_COLUMNS: &str = "id, job_type, variant, status, created_on, started_on, completed_on, \
                           last_status_update, file_ref, data, errors, exceptions";

/// 时间戳落库格式（定长，可按字符串排序）
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_ts(field: &str, raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::FieldValueError {
            field: field.to_string(),
            message: format!("{}: {}", raw, e),
        })
}

fn parse_opt_ts(field: &str, raw: Option<String>) -> RepositoryResult<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(field, &s)).transpose()
}

// ==========================================
// JobRow - 原始行（列 → 文本/整数）
// ==========================================
struct JobRow {
    id: String,
    job_type: String,
    variant: String,
    status: i64,
    created_on: String,
    started_on: Option<String>,
    completed_on: Option<String>,
    last_status_update: Option<String>,
    file_ref: String,
    data: Option<String>,
    errors: Option<String>,
    exceptions: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            job_type: row.get(1)?,
            variant: row.get(2)?,
            status: row.get(3)?,
            created_on: row.get(4)?,
            started_on: row.get(5)?,
            completed_on: row.get(6)?,
            last_status_update: row.get(7)?,
            file_ref: row.get(8)?,
            data: row.get(9)?,
            errors: row.get(10)?,
            exceptions: row.get(11)?,
        })
    }

    fn into_job(self) -> RepositoryResult<ImportJob> {
        let status = ImportJobStatus::from_db_code(self.status).ok_or_else(|| {
            RepositoryError::FieldValueError {
                field: "status".to_string(),
                message: format!("未知状态编码: {}", self.status),
            }
        })?;
        let variant = JobVariant::from_str(&self.variant).ok_or_else(|| {
            RepositoryError::FieldValueError {
                field: "variant".to_string(),
                message: format!("未知作业变体: {}", self.variant),
            }
        })?;

        let data = match self.data {
            Some(json) => Some(serde_json::from_str::<Vec<NormalizedRecord>>(&json)?),
            None => None,
        };
        // errors 列存校验报告，exceptions 列存异常链，二者至多其一
        let errors = match (self.errors, self.exceptions) {
            (Some(json), _) => Some(JobErrors::Validation(serde_json::from_str::<ErrorReport>(&json)?)),
            (None, Some(trace)) => Some(JobErrors::Exception(trace)),
            (None, None) => None,
        };

        Ok(ImportJob {
            id: self.id,
            job_type: self.job_type,
            variant,
            status,
            created_on: parse_ts("created_on", &self.created_on)?,
            started_on: parse_opt_ts("started_on", self.started_on)?,
            completed_on: parse_opt_ts("completed_on", self.completed_on)?,
            last_status_update: parse_opt_ts("last_status_update", self.last_status_update)?,
            source_file: self.file_ref,
            data,
            errors,
        })
    }
}

/// 作业载荷 → (data, errors, exceptions) 列值
fn payload_columns(job: &ImportJob) -> RepositoryResult<(Option<String>, Option<String>, Option<String>)> {
    let data = job.data.as_ref().map(serde_json::to_string).transpose()?;
    let (errors, exceptions) = match &job.errors {
        Some(JobErrors::Validation(report)) => (Some(serde_json::to_string(report)?), None),
        Some(JobErrors::Exception(trace)) => (None, Some(trace.clone())),
        None => (None, None),
    };
    Ok((data, errors, exceptions))
}

// ==========================================
// ImportJobRepositoryImpl
// ==========================================
pub struct ImportJobRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl ImportJobRepositoryImpl {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn query_jobs(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> RepositoryResult<Vec<ImportJob>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(JobRow::into_job).collect()
    }
}

#[async_trait]
impl ImportJobRepository for ImportJobRepositoryImpl {
    async fn insert_job(&self, job: &ImportJob) -> RepositoryResult<()> {
        let (data, errors, exceptions) = payload_columns(job)?;
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO import_job (
                id, job_type, variant, status, created_on, started_on, completed_on,
                last_status_update, file_ref, data, errors, exceptions
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                job.id,
                job.job_type,
                job.variant.as_str(),
                job.status.to_db_code(),
                format_ts(job.created_on),
                job.started_on.map(format_ts),
                job.completed_on.map(format_ts),
                job.last_status_update.map(format_ts),
                job.source_file,
                data,
                errors,
                exceptions,
            ],
        )?;

        tx.commit()?;
        debug!(job_id = %job.id, status = %job.status, "作业已插入");
        Ok(())
    }

    async fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM import_job WHERE id = ?1", JOB_COLUMNS),
                params![job_id],
                JobRow::from_row,
            )
            .optional()?;
        row.map(JobRow::into_job).transpose()
    }

    async fn save_transition(
        &self,
        job: &ImportJob,
        expected: ImportJobStatus,
    ) -> RepositoryResult<()> {
        let (data, errors, exceptions) = payload_columns(job)?;
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let rows_affected = tx.execute(
            r#"
            UPDATE import_job
               SET status = ?1, started_on = ?2, completed_on = ?3, last_status_update = ?4,
                   data = ?5, errors = ?6, exceptions = ?7
             WHERE id = ?8 AND status = ?9
            "#,
            params![
                job.status.to_db_code(),
                job.started_on.map(format_ts),
                job.completed_on.map(format_ts),
                job.last_status_update.map(format_ts),
                data,
                errors,
                exceptions,
                job.id,
                expected.to_db_code(),
            ],
        )?;

        if rows_affected == 0 {
            // 区分“记录不存在”与“状态已变化”
            let exists = tx
                .query_row(
                    "SELECT status FROM import_job WHERE id = ?1",
                    params![job.id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;

            return Err(match exists {
                Some(_) => RepositoryError::StaleStatus {
                    job_id: job.id.clone(),
                    expected: expected.to_string(),
                },
                None => RepositoryError::NotFound {
                    entity: "ImportJob".to_string(),
                    id: job.id.clone(),
                },
            });
        }

        tx.commit()?;
        debug!(job_id = %job.id, from = %expected, to = %job.status, "状态转换已落库");
        Ok(())
    }

    async fn find_stale(&self, older_than: DateTime<Utc>) -> RepositoryResult<Vec<ImportJob>> {
        let sql = format!(
            r#"
            SELECT {} FROM import_job
             WHERE status IN (?1, ?2)
               AND COALESCE(last_status_update, created_on) < ?3
             ORDER BY COALESCE(last_status_update, created_on) ASC
            "#,
            JOB_COLUMNS
        );

        let conn = self.get_conn()?;
        Self::query_jobs(
            &conn,
            &sql,
            params![
                ImportJobStatus::Started.to_db_code(),
                ImportJobStatus::FileProcessed.to_db_code(),
                format_ts(older_than),
            ],
        )
    }
}

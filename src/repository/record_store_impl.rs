// ==========================================
// 批量导入作业引擎 - 目标存储实现（SQLite）
// ==========================================
// 表: imported_record (dataset, record_key) 主键
// 策略: INSERT ... ON CONFLICT DO UPDATE，单事务
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::record::NormalizedRecord;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_job_repo_impl::format_ts;
use crate::repository::record_store::RecordStore;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// 计算记录身份键
///
/// 自然键为空时使用整条记录的 JSON（字段有序）
pub fn record_key(natural_key: &[String], record: &NormalizedRecord) -> RepositoryResult<String> {
    if natural_key.is_empty() {
        return Ok(serde_json::to_string(record)?);
    }
    let parts: Vec<&Value> = natural_key
        .iter()
        .map(|k| record.get(k).unwrap_or(&Value::Null))
        .collect();
    Ok(serde_json::to_string(&parts)?)
}

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn bulk_upsert(
        &self,
        dataset: &str,
        natural_key: &[String],
        job_id: &str,
        records: &[NormalizedRecord],
    ) -> RepositoryResult<usize> {
        // 先序列化，失败时不开启事务
        let rows = records
            .iter()
            .map(|r| Ok((record_key(natural_key, r)?, serde_json::to_string(r)?)))
            .collect::<RepositoryResult<Vec<(String, String)>>>()?;

        let now = format_ts(Utc::now());
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO imported_record (dataset, record_key, job_id, payload_json, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT (dataset, record_key) DO UPDATE SET
                    job_id = excluded.job_id,
                    payload_json = excluded.payload_json,
                    updated_at = excluded.updated_at
                "#,
            )?;
            for (key, payload) in &rows {
                stmt.execute(params![dataset, key, job_id, payload, now])?;
            }
        }

        tx.commit()?;

        // 批内同键记录按顺序覆盖，只计一次
        let written = rows
            .iter()
            .map(|(key, _)| key.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        if written < rows.len() {
            warn!(dataset, job_id, rows = rows.len(), written, "批内存在重复自然键，后者覆盖前者");
        }
        debug!(dataset, job_id, written, "批量 upsert 完成");
        Ok(written)
    }

    async fn count(&self, dataset: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM imported_record WHERE dataset = ?1",
            params![dataset],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    async fn list(&self, dataset: &str) -> RepositoryResult<Vec<NormalizedRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT payload_json FROM imported_record WHERE dataset = ?1 ORDER BY record_key",
        )?;
        let payloads = stmt
            .query_map(params![dataset], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(RepositoryError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::domain::job::ImportJob;
    use crate::domain::types::JobVariant;
    use crate::repository::import_job_repo::ImportJobRepository;
    use crate::repository::import_job_repo_impl::ImportJobRepositoryImpl;
    use serde_json::json;

    fn record(email: &str, age: i64) -> NormalizedRecord {
        let mut r = NormalizedRecord::new();
        r.insert("email".to_string(), json!(email));
        r.insert("age".to_string(), json!(age));
        r
    }

    async fn setup() -> (SqliteRecordStore, String) {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let jobs = ImportJobRepositoryImpl::from_connection(conn.clone());
        let job = ImportJob::new("a.csv", "people", JobVariant::Simple);
        jobs.insert_job(&job).await.unwrap();
        (SqliteRecordStore::from_connection(conn), job.id)
    }

    #[test]
    fn test_record_key_uses_natural_key_fields() {
        let key = record_key(&["email".to_string()], &record("a@x.io", 1)).unwrap();
        assert_eq!(key, r#"["a@x.io"]"#);

        let whole = record_key(&[], &record("a@x.io", 1)).unwrap();
        assert_eq!(whole, r#"{"age":1,"email":"a@x.io"}"#);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_natural_key() {
        let (store, job_id) = setup().await;
        let key = vec!["email".to_string()];

        store
            .bulk_upsert("people", &key, &job_id, &[record("a@x.io", 1), record("b@x.io", 2)])
            .await
            .unwrap();
        store
            .bulk_upsert("people", &key, &job_id, &[record("a@x.io", 9)])
            .await
            .unwrap();

        assert_eq!(store.count("people").await.unwrap(), 2);
        let rows = store.list("people").await.unwrap();
        assert_eq!(rows[0]["age"], json!(9));
        assert_eq!(store.count("other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_keys_in_batch_counted_once() {
        let (store, job_id) = setup().await;
        let key = vec!["email".to_string()];

        let written = store
            .bulk_upsert(
                "people",
                &key,
                &job_id,
                &[record("a@x.io", 1), record("b@x.io", 2), record("a@x.io", 3)],
            )
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(store.count("people").await.unwrap(), written);
        let rows = store.list("people").await.unwrap();
        assert_eq!(rows[0]["age"], json!(3));
    }

    #[tokio::test]
    async fn test_failed_row_rolls_back_batch() {
        let (store, job_id) = setup().await;
        {
            let conn = store.get_conn().unwrap();
            conn.execute_batch(
                r#"
                CREATE TRIGGER reject_bad BEFORE INSERT ON imported_record
                WHEN NEW.payload_json LIKE '%bad@x.io%'
                BEGIN SELECT RAISE(ABORT, 'disk full'); END;
                "#,
            )
            .unwrap();
        }

        let result = store
            .bulk_upsert(
                "people",
                &["email".to_string()],
                &job_id,
                &[record("a@x.io", 1), record("bad@x.io", 2)],
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.count("people").await.unwrap(), 0);
    }
}

// ==========================================
// 批量导入作业引擎 - 配置管理器
// ==========================================
// 职责: 作业配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::config::job_config::{JobConfig, DEFAULT_STALE_AFTER_SECS};
use crate::db::open_sqlite_connection;
use crate::domain::types::JobVariant;
use crate::importer::schema::SchemaDefinition;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取作业类型下的某个配置项，带默认值
    fn get_job_value_or_default(
        &self,
        job_type: &str,
        name: &str,
        default: &str,
    ) -> RepositoryResult<String> {
        Ok(self
            .get_global_config_value(&config_keys::job_key(job_type, name))?
            .unwrap_or_else(|| default.to_string()))
    }

    fn get_job_flag(&self, job_type: &str, name: &str, default: bool) -> RepositoryResult<bool> {
        let value = self.get_job_value_or_default(job_type, name, if default { "true" } else { "false" })?;
        match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => {
                tracing::warn!(
                    config_key = %config_keys::job_key(job_type, name),
                    raw_value = %value,
                    "布尔配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 整体写入作业配置（单事务）
    pub fn save_job_config(&self, config: &JobConfig) -> RepositoryResult<usize> {
        let mut entries: BTreeMap<&str, String> = BTreeMap::new();
        entries.insert(config_keys::VARIANT, config.variant.as_str().to_string());
        entries.insert(config_keys::AUTO_START, config.auto_start.to_string());
        entries.insert(config_keys::CATCH_EXCEPTIONS, config.catch_exceptions.to_string());
        entries.insert(config_keys::DATASET, config.dataset_name().to_string());
        entries.insert(config_keys::STALE_AFTER_SECS, config.stale_after_secs.to_string());
        if let Some(schema) = &config.schema {
            entries.insert(config_keys::SCHEMA, serde_json::to_string(schema)?);
        }

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut count = 0;
        for (name, value) in &entries {
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
                params![config_keys::job_key(&config.job_type, name), value],
            )?;
        }
        tx.commit()?;
        Ok(count)
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_variant(&self, job_type: &str) -> RepositoryResult<JobVariant> {
        let value = self.get_job_value_or_default(job_type, config_keys::VARIANT, "simple")?;
        Ok(JobVariant::from_str(&value).unwrap_or_else(|| {
            tracing::warn!(job_type, raw_value = %value, "作业变体配置无法识别，使用 simple");
            JobVariant::Simple
        }))
    }

    async fn get_auto_start(&self, job_type: &str) -> RepositoryResult<bool> {
        self.get_job_flag(job_type, config_keys::AUTO_START, true)
    }

    async fn get_catch_exceptions(&self, job_type: &str) -> RepositoryResult<bool> {
        self.get_job_flag(job_type, config_keys::CATCH_EXCEPTIONS, true)
    }

    async fn get_dataset(&self, job_type: &str) -> RepositoryResult<String> {
        let value = self.get_job_value_or_default(job_type, config_keys::DATASET, job_type)?;
        if value.trim().is_empty() {
            Ok(job_type.to_string())
        } else {
            Ok(value.trim().to_string())
        }
    }

    async fn get_stale_after_secs(&self, job_type: &str) -> RepositoryResult<u64> {
        let default = DEFAULT_STALE_AFTER_SECS.to_string();
        let value = self.get_job_value_or_default(job_type, config_keys::STALE_AFTER_SECS, &default)?;
        Ok(value.trim().parse::<u64>().unwrap_or(DEFAULT_STALE_AFTER_SECS))
    }

    async fn get_schema_definition(&self, job_type: &str) -> RepositoryResult<Option<SchemaDefinition>> {
        match self.get_global_config_value(&config_keys::job_key(job_type, config_keys::SCHEMA))? {
            // Schema 损坏时不能静默降级
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    /// 作业配置键前缀
    pub const JOB_PREFIX: &str = "import_job";

    pub const VARIANT: &str = "variant";
    pub const AUTO_START: &str = "auto_start";
    pub const CATCH_EXCEPTIONS: &str = "catch_exceptions";
    pub const DATASET: &str = "dataset";
    pub const STALE_AFTER_SECS: &str = "stale_after_secs";
    pub const SCHEMA: &str = "schema"; // SchemaDefinition (JSON)

    /// import_job/<job_type>/<name>
    pub fn job_key(job_type: &str, name: &str) -> String {
        format!("{}/{}/{}", JOB_PREFIX, job_type.trim(), name)
    }
}

// ==========================================
// 批量导入作业引擎 - 导入作业 API
// ==========================================
// 职责: 面向调用方的作业入口（创建 / 保存 / 执行 / 重试 / 查询）
// 说明: 按 job_type 缓存流水线；Schema 可由代码注册，或从 config_kv 加载
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ImportConfigReader, JobConfig};
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::job::{ImportJob, JobErrors};
use crate::domain::types::ImportJobStatus;
use crate::engine::{ImportPipeline, JobLocks, ProcessReport, SaveReport};
use crate::importer::schema::Schema;
use crate::repository::{ImportJobRepository, ImportJobRepositoryImpl, SqliteRecordStore};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

/// SQLite 落地的流水线
pub type SqlitePipeline = ImportPipeline<ImportJobRepositoryImpl, SqliteRecordStore>;

pub struct ImportJobApi {
    jobs: Arc<ImportJobRepositoryImpl>,
    store: Arc<SqliteRecordStore>,
    config_manager: ConfigManager,
    locks: Arc<JobLocks>,
    pipelines: Mutex<HashMap<String, Arc<SqlitePipeline>>>,
}

impl ImportJobApi {
    /// 打开数据库（不存在的表会被创建）
    pub fn new(db_path: &str) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ApiResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
            init_schema(&guard).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        }

        Ok(Self {
            jobs: Arc::new(ImportJobRepositoryImpl::from_connection(conn.clone())),
            store: Arc::new(SqliteRecordStore::from_connection(conn.clone())),
            config_manager: ConfigManager::from_connection(conn)?,
            locks: Arc::new(JobLocks::new()),
            pipelines: Mutex::new(HashMap::new()),
        })
    }

    pub fn config_manager(&self) -> &ConfigManager {
        &self.config_manager
    }

    /// 以代码定义的 Schema 注册作业类型（覆盖已缓存的同名流水线）
    pub fn register_job_type(&self, config: JobConfig, schema: Schema) -> ApiResult<()> {
        let job_type = config.job_type.clone();
        let pipeline = ImportPipeline::new(self.jobs.clone(), self.store.clone(), Arc::new(schema), config)
            .with_locks(self.locks.clone());
        self.pipelines
            .lock()
            .map_err(|e| ApiError::InternalError(e.to_string()))?
            .insert(job_type.clone(), Arc::new(pipeline));
        info!(job_type = %job_type, "作业类型已注册");
        Ok(())
    }

    /// 取作业类型对应的流水线；未注册时从配置加载
    pub async fn pipeline_for(&self, job_type: &str) -> ApiResult<Arc<SqlitePipeline>> {
        if let Some(p) = self.cached_pipeline(job_type)? {
            return Ok(p);
        }

        let config = self.config_manager.load_job_config(job_type).await?;
        let pipeline = Arc::new(
            ImportPipeline::from_config(self.jobs.clone(), self.store.clone(), config)?
                .with_locks(self.locks.clone()),
        );

        let mut map = self
            .pipelines
            .lock()
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        Ok(map.entry(job_type.to_string()).or_insert(pipeline).clone())
    }

    fn cached_pipeline(&self, job_type: &str) -> ApiResult<Option<Arc<SqlitePipeline>>> {
        Ok(self
            .pipelines
            .lock()
            .map_err(|e| ApiError::InternalError(e.to_string()))?
            .get(job_type)
            .cloned())
    }

    async fn pipeline_for_job(&self, job_id: &str) -> ApiResult<(Arc<SqlitePipeline>, ImportJob)> {
        let job = self.get_job(job_id).await?;
        let pipeline = self.pipeline_for(&job.job_type).await?;
        Ok((pipeline, job))
    }

    // ==========================================
    // 作业操作
    // ==========================================

    /// 创建新作业（未落库）
    pub async fn create_job(&self, source_file: &str, job_type: &str) -> ApiResult<ImportJob> {
        if source_file.trim().is_empty() {
            return Err(ApiError::InvalidInput("源文件不能为空".to_string()));
        }
        let pipeline = self.pipeline_for(job_type).await?;
        Ok(pipeline.new_job(source_file))
    }

    /// 保存作业；auto_start 时随后执行
    pub async fn save_job(&self, job: ImportJob) -> ApiResult<SaveReport> {
        let pipeline = self.pipeline_for(&job.job_type).await?;
        Ok(pipeline.save(job).await?)
    }

    /// 执行作业
    pub async fn process_job(&self, job_id: &str) -> ApiResult<ProcessReport> {
        let (pipeline, _) = self.pipeline_for_job(job_id).await?;
        Ok(pipeline.process(job_id).await?)
    }

    /// 显式重试失败作业（success 不可重试）
    pub async fn retry_job(&self, job_id: &str) -> ApiResult<ProcessReport> {
        let (pipeline, job) = self.pipeline_for_job(job_id).await?;
        info!(job_id, status = %job.status, "显式重试作业");
        Ok(pipeline.retry(job_id).await?)
    }

    /// 人工终止作业（已完成的作业不可终止）
    pub async fn abort_job(&self, job_id: &str, reason: &str) -> ApiResult<ImportJob> {
        if reason.trim().is_empty() {
            return Err(ApiError::InvalidInput("终止原因不能为空".to_string()));
        }
        let (pipeline, _) = self.pipeline_for_job(job_id).await?;
        Ok(pipeline.abort(job_id, reason.trim()).await?)
    }

    pub async fn get_job(&self, job_id: &str) -> ApiResult<ImportJob> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("ImportJob(id={})不存在", job_id)))
    }

    pub async fn is_valid(&self, job_id: &str) -> ApiResult<bool> {
        Ok(self.get_job(job_id).await?.is_valid())
    }

    pub async fn get_errors(&self, job_id: &str) -> ApiResult<Option<JobErrors>> {
        Ok(self.get_job(job_id).await?.errors)
    }

    pub async fn get_status(&self, job_id: &str) -> ApiResult<ImportJobStatus> {
        Ok(self.get_job(job_id).await?.status)
    }

    /// 超时未更新的执行中作业
    pub async fn list_stale_jobs(
        &self,
        job_type: &str,
        threshold: Option<chrono::Duration>,
    ) -> ApiResult<Vec<ImportJob>> {
        let pipeline = self.pipeline_for(job_type).await?;
        Ok(pipeline.find_stale_jobs(threshold).await?)
    }

    /// 回收超时作业（标记为 errors）
    pub async fn recover_stale_job(&self, job_id: &str) -> ApiResult<ImportJob> {
        let (pipeline, _) = self.pipeline_for_job(job_id).await?;
        Ok(pipeline.recover_stale_job(job_id).await?)
    }
}

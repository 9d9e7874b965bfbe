// ==========================================
// 批量导入作业引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义作业配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::job_config::JobConfig;
use crate::domain::types::JobVariant;
use crate::importer::schema::SchemaDefinition;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取作业变体
    ///
    /// # 默认值
    /// - simple
    async fn get_variant(&self, job_type: &str) -> RepositoryResult<JobVariant>;

    /// 保存后是否自动执行
    ///
    /// # 默认值
    /// - true
    async fn get_auto_start(&self, job_type: &str) -> RepositoryResult<bool>;

    /// 是否吞掉基础设施异常（仍会记录到作业）
    ///
    /// # 默认值
    /// - true
    async fn get_catch_exceptions(&self, job_type: &str) -> RepositoryResult<bool>;

    /// 目标数据集
    ///
    /// # 默认值
    /// - job_type
    async fn get_dataset(&self, job_type: &str) -> RepositoryResult<String>;

    /// 看门狗阈值（秒）
    ///
    /// # 默认值
    /// - 3600
    async fn get_stale_after_secs(&self, job_type: &str) -> RepositoryResult<u64>;

    /// Schema 描述（JSON）；未配置返回 None
    async fn get_schema_definition(&self, job_type: &str) -> RepositoryResult<Option<SchemaDefinition>>;

    /// 汇总读取完整作业配置
    async fn load_job_config(&self, job_type: &str) -> RepositoryResult<JobConfig> {
        Ok(JobConfig {
            job_type: job_type.to_string(),
            variant: self.get_variant(job_type).await?,
            auto_start: self.get_auto_start(job_type).await?,
            catch_exceptions: self.get_catch_exceptions(job_type).await?,
            dataset: self.get_dataset(job_type).await?,
            stale_after_secs: self.get_stale_after_secs(job_type).await?,
            schema: self.get_schema_definition(job_type).await?,
        })
    }
}

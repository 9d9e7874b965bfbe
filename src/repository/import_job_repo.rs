// ==========================================
// 批量导入作业引擎 - 导入作业 Repository Trait
// ==========================================
// 职责: 定义 import_job 表的数据访问接口（不包含业务逻辑）
// 红线: Repository 不判断转换是否合法，只做状态比较写入
// ==========================================

use crate::domain::job::ImportJob;
use crate::domain::types::ImportJobStatus;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// ==========================================
// ImportJobRepository Trait
// ==========================================
// 实现者: ImportJobRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait ImportJobRepository: Send + Sync {
    /// 插入新作业（单独事务）
    ///
    /// # 返回
    /// - Err(UniqueConstraintViolation): 作业 ID 已存在
    async fn insert_job(&self, job: &ImportJob) -> RepositoryResult<()>;

    /// 按 ID 查询作业
    ///
    /// # 返回
    /// - Ok(None): 作业不存在
    async fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>>;

    /// 持久化状态转换结果（比较写入）
    ///
    /// # 参数
    /// - job: 转换后的作业
    /// - expected: 转换前的状态；库中状态不一致时拒绝写入
    ///
    /// # 返回
    /// - Err(StaleStatus): 状态已被其他执行者修改
    /// - Err(NotFound): 作业不存在
    /// - Err: 数据库错误（事务回滚，原记录不变）
    async fn save_transition(
        &self,
        job: &ImportJob,
        expected: ImportJobStatus,
    ) -> RepositoryResult<()>;

    /// 查询执行中且最近状态变更早于 older_than 的作业
    async fn find_stale(&self, older_than: DateTime<Utc>) -> RepositoryResult<Vec<ImportJob>>;
}

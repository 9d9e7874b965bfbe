// ==========================================
// 批量导入作业引擎 - 目标存储 Trait
// ==========================================
// 职责: 规范化记录批量写入（按自然键 upsert）
// 红线: 全有或全无，任何一行失败整批回滚
// ==========================================

use crate::domain::record::NormalizedRecord;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 批量 upsert
    ///
    /// # 参数
    /// - dataset: 目标数据集名
    /// - natural_key: 自然键字段；为空时以整条记录作为身份
    /// - job_id: 写入来源作业
    /// - records: 规范化记录
    ///
    /// # 返回
    /// - Ok(usize): 写入的不同记录数（批内同键记录以后者为准）
    /// - Err: 数据库错误（整个事务回滚）
    async fn bulk_upsert(
        &self,
        dataset: &str,
        natural_key: &[String],
        job_id: &str,
        records: &[NormalizedRecord],
    ) -> RepositoryResult<usize>;

    /// 统计数据集记录数
    async fn count(&self, dataset: &str) -> RepositoryResult<usize>;

    /// 列出数据集所有记录（按身份键排序）
    async fn list(&self, dataset: &str) -> RepositoryResult<Vec<NormalizedRecord>>;
}

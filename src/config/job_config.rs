// ==========================================
// 批量导入作业引擎 - 作业配置
// ==========================================
// 职责: 单个作业类型的运行参数（变体 / 自动启动 / 异常捕获 / Schema）
// 存储: config_kv 表，键 import_job/<job_type>/<name>
// ==========================================

use crate::domain::types::JobVariant;
use crate::importer::schema::SchemaDefinition;
use serde::{Deserialize, Serialize};

/// 默认看门狗阈值（秒）
pub const DEFAULT_STALE_AFTER_SECS: u64 = 3600;

/// 超时阈值上限（100 年）
pub const MAX_STALE_AFTER_SECS: u64 = 36_500 * 86_400;

fn default_true() -> bool {
    true
}

fn default_stale_after_secs() -> u64 {
    DEFAULT_STALE_AFTER_SECS
}

// ==========================================
// JobConfig
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub job_type: String,
    #[serde(default)]
    pub variant: JobVariant,
    /// 保存后自动执行
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// 基础设施异常只记录、不向调用方抛出
    #[serde(default = "default_true")]
    pub catch_exceptions: bool,
    /// 目标数据集；为空时取 job_type
    #[serde(default)]
    pub dataset: String,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default)]
    pub schema: Option<SchemaDefinition>,
}

impl JobConfig {
    pub fn new(job_type: impl Into<String>) -> Self {
        let job_type = job_type.into();
        Self {
            dataset: job_type.clone(),
            job_type,
            variant: JobVariant::default(),
            auto_start: true,
            catch_exceptions: true,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            schema: None,
        }
    }

    pub fn with_variant(mut self, variant: JobVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_catch_exceptions(mut self, catch_exceptions: bool) -> Self {
        self.catch_exceptions = catch_exceptions;
        self
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = dataset.into();
        self
    }

    pub fn with_schema(mut self, schema: SchemaDefinition) -> Self {
        self.schema = Some(schema);
        self
    }

    /// 实际写入的数据集名
    pub fn dataset_name(&self) -> &str {
        if self.dataset.trim().is_empty() {
            &self.job_type
        } else {
            &self.dataset
        }
    }

    /// 超时阈值；超过 MAX_STALE_AFTER_SECS 的配置按上限处理
    pub fn stale_after(&self) -> chrono::Duration {
        let secs = self.stale_after_secs.min(MAX_STALE_AFTER_SECS) as i64;
        chrono::Duration::try_seconds(secs).unwrap_or_else(|| chrono::Duration::days(36_500))
    }
}

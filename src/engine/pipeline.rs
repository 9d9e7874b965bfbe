// ==========================================
// 批量导入作业引擎 - 导入流水线
// ==========================================
// 职责: 编排 开始 → 解码 → 校验 → 落库 → 完成 的完整作业执行
// 红线: 所有状态变化经 state_machine 计算，经 Repository 比较写入
//       校验失败只记录不抛出；记录失败本身始终上抛
// ==========================================

use crate::config::job_config::JobConfig;
use crate::domain::job::{ImportJob, JobErrors};
use crate::domain::record::NormalizedRecord;
use crate::domain::types::{ImportJobStatus, JobVariant};
use crate::engine::error::{error_trace, JobError, JobResult};
use crate::engine::job_locks::JobLocks;
use crate::engine::state_machine::{apply_transition, InvalidTransitionError, Transition};
use crate::importer::error_report::ErrorReport;
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::import_trait::{DecodedFile, FileDecoder};
use crate::importer::record_validator::RecordValidator;
use crate::importer::schema::Schema;
use crate::repository::import_job_repo::ImportJobRepository;
use crate::repository::record_store::RecordStore;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// ProcessOutcome - 单次执行结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// 全部记录已落库
    Success { records: usize },
    /// 数据校验失败（已记录到作业）
    ValidationFailed { report: ErrorReport },
    /// 基础设施失败（已记录到作业，catch_exceptions 时返回）
    InfraFailed { trace: String },
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Success { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub job: ImportJob,
    pub outcome: ProcessOutcome,
    /// Schema 不认识的表头（仅提示）
    pub extra_headers: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct SaveReport {
    pub job: ImportJob,
    /// auto_start 触发的执行结果
    pub process: Option<ProcessReport>,
}

/// 校验阶段结果（不跨 await 持有校验器）
enum Validated {
    Valid(Vec<NormalizedRecord>),
    Invalid(ErrorReport),
}

// ==========================================
// ImportPipeline
// ==========================================
pub struct ImportPipeline<J: ?Sized, S: ?Sized>
where
    J: ImportJobRepository,
    S: RecordStore,
{
    jobs: Arc<J>,
    store: Arc<S>,
    decoder: Arc<dyn FileDecoder>,
    schema: Arc<Schema>,
    config: JobConfig,
    locks: Arc<JobLocks>,
}

impl<J: ?Sized, S: ?Sized> ImportPipeline<J, S>
where
    J: ImportJobRepository,
    S: RecordStore,
{
    /// 创建流水线（默认按扩展名解码）
    ///
    /// # 参数
    /// - jobs: 作业仓储
    /// - store: 目标存储
    /// - schema: 行校验 Schema
    /// - config: 作业配置
    pub fn new(jobs: Arc<J>, store: Arc<S>, schema: Arc<Schema>, config: JobConfig) -> Self {
        Self {
            jobs,
            store,
            decoder: Arc::new(UniversalFileParser),
            schema,
            config,
            locks: Arc::new(JobLocks::new()),
        }
    }

    /// 从作业配置中的 Schema 描述创建流水线
    pub fn from_config(jobs: Arc<J>, store: Arc<S>, config: JobConfig) -> JobResult<Self> {
        let definition = config.schema.as_ref().ok_or_else(|| {
            JobError::Config(format!("作业类型 {} 未配置 Schema", config.job_type))
        })?;
        let schema = Schema::from_definition(definition).map_err(|e| JobError::Config(e.to_string()))?;
        Ok(Self::new(jobs, store, Arc::new(schema), config))
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn FileDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// 与其他流水线共享作业锁
    pub fn with_locks(mut self, locks: Arc<JobLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// 按当前配置创建新作业（未落库）
    pub fn new_job(&self, source_file: impl Into<String>) -> ImportJob {
        ImportJob::new(source_file, self.config.job_type.clone(), self.config.variant)
    }

    pub async fn get_job(&self, job_id: &str) -> JobResult<ImportJob> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| JobError::JobNotFound(job_id.to_string()))
    }

    /// 保存新作业；auto_start 时在提交后立即执行
    ///
    /// 插入与执行分属不同事务：执行前崩溃时作业停留在 not_started，可再次触发
    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type))]
    pub async fn save(&self, job: ImportJob) -> JobResult<SaveReport> {
        self.jobs.insert_job(&job).await?;
        info!(status = %job.status, "作业已保存");

        if !(self.config.auto_start && job.status == ImportJobStatus::NotStarted) {
            return Ok(SaveReport { job, process: None });
        }

        let report = self.process(&job.id).await?;
        Ok(SaveReport {
            job: report.job.clone(),
            process: Some(report),
        })
    }

    /// 执行作业（主入口）
    ///
    /// # 返回
    /// - Ok(ProcessReport): 成功、校验失败、或已记录的基础设施失败
    /// - Err(InvalidTransition): 作业当前状态不允许开始
    /// - Err(Decode/Storage): 基础设施失败且 catch_exceptions = false（已先记录）
    /// - Err(Repository): 作业状态写入失败
    #[instrument(skip(self), fields(job_type = %self.config.job_type))]
    pub async fn process(&self, job_id: &str) -> JobResult<ProcessReport> {
        let _guard = self.locks.acquire(job_id).await;

        // === 步骤 1: 开始（原子）===
        let job = self.get_job(job_id).await?;
        let job = self.transition(&job, Transition::Start).await?;
        info!(file = %job.source_file, variant = %job.variant, "作业开始执行");

        // === 步骤 2: 解码 ===
        let decoded = match self.decoder.decode(Path::new(&job.source_file)) {
            Ok(decoded) => decoded,
            Err(e) => return self.record_failure(job, JobError::Decode(e), BTreeSet::new()).await,
        };

        let extra_headers = RecordValidator::check_extra_headers(&self.schema, &decoded.headers);
        if !extra_headers.is_empty() {
            warn!(extra_headers = ?extra_headers, "存在 Schema 未定义的表头，已忽略");
        }

        // === 步骤 3: 校验 ===
        let records = match self.validate(decoded) {
            Validated::Valid(records) => records,
            Validated::Invalid(report) => {
                return self.record_invalid(job, report, extra_headers).await;
            }
        };

        // === 步骤 4: 落库 ===
        let job = match job.variant {
            JobVariant::TwoPhase => {
                let marked = self
                    .transition(&job, Transition::MarkFileProcessed { data: records.clone() })
                    .await;
                match marked {
                    Ok(job) => job,
                    Err(e) => return self.record_failure(job, e, extra_headers).await,
                }
            }
            JobVariant::Simple => job,
        };

        let written = match self
            .store
            .bulk_upsert(
                self.config.dataset_name(),
                self.schema.natural_key(),
                &job.id,
                &records,
            )
            .await
        {
            Ok(n) => n,
            Err(e) => return self.record_failure(job, JobError::Storage(e), extra_headers).await,
        };

        // === 步骤 5: 完成 ===
        let data = match job.variant {
            JobVariant::Simple => Some(records),
            JobVariant::TwoPhase => None,
        };
        let job = self.transition(&job, Transition::MarkSuccess { data }).await?;
        info!(rows = written, "作业执行成功");

        Ok(ProcessReport {
            job,
            outcome: ProcessOutcome::Success { records: written },
            extra_headers,
        })
    }

    /// 仅执行开始转换，不解码不落库（由外部执行者接管作业时使用）
    pub async fn start(&self, job_id: &str) -> JobResult<ImportJob> {
        let _guard = self.locks.acquire(job_id).await;
        let job = self.get_job(job_id).await?;
        self.transition(&job, Transition::Start).await
    }

    /// 人工终止作业，记录原因并标记为 errors
    ///
    /// success 及其他已完成状态不可终止
    #[instrument(skip(self, reason), fields(job_type = %self.config.job_type))]
    pub async fn abort(&self, job_id: &str, reason: impl Into<String>) -> JobResult<ImportJob> {
        let _guard = self.locks.acquire(job_id).await;
        let job = self.get_job(job_id).await?;
        let reason = reason.into();
        warn!(job_id, status = %job.status, reason = %reason, "人工终止作业");
        self.transition(
            &job,
            Transition::MarkErrors {
                errors: JobErrors::Exception(reason),
            },
        )
        .await
    }

    /// 显式重试（仅允许从失败状态开始）
    pub async fn retry(&self, job_id: &str) -> JobResult<ProcessReport> {
        self.process(job_id).await
    }

    /// 并发执行多个作业；单个作业失败不影响其他作业
    pub async fn process_many(&self, job_ids: &[String]) -> Vec<(String, JobResult<ProcessReport>)> {
        let futures = job_ids.iter().map(|id| async move {
            let result = self.process(id).await;
            (id.clone(), result)
        });
        let results = join_all(futures).await;

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(total = results.len(), failed, "批量执行完成");
        results
    }

    /// 查询超时未更新的执行中作业（供外部看门狗使用）
    ///
    /// # 参数
    /// - threshold: 超时阈值；None 时使用作业配置
    pub async fn find_stale_jobs(&self, threshold: Option<chrono::Duration>) -> JobResult<Vec<ImportJob>> {
        let threshold = threshold.unwrap_or_else(|| self.config.stale_after());
        // 阈值过大时视为无截止下限
        let older_than = Utc::now()
            .checked_sub_signed(threshold)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let jobs = self.jobs.find_stale(older_than).await?;
        Ok(jobs
            .into_iter()
            .filter(|j| j.job_type == self.config.job_type)
            .collect())
    }

    /// 将超时作业标记为失败，之后可显式重试
    #[instrument(skip(self), fields(job_type = %self.config.job_type))]
    pub async fn recover_stale_job(&self, job_id: &str) -> JobResult<ImportJob> {
        let _guard = self.locks.acquire(job_id).await;
        let job = self.get_job(job_id).await?;

        if !job.status.is_in_flight() {
            return Err(InvalidTransitionError {
                job_id: job.id.clone(),
                from: job.status,
                to: ImportJobStatus::Errors,
            }
            .into());
        }

        let idle = job.staleness(Utc::now());
        let threshold = self.config.stale_after();
        if idle < threshold {
            return Err(JobError::NotStale {
                job_id: job.id.clone(),
                idle_secs: idle.num_seconds(),
                threshold_secs: threshold.num_seconds(),
            });
        }

        let trace = format!(
            "stale job: no status update for {}s while {}",
            idle.num_seconds(),
            job.status
        );
        warn!(job_id, status = %job.status, idle_secs = idle.num_seconds(), "回收超时作业");
        self.transition(
            &job,
            Transition::MarkErrors {
                errors: JobErrors::Exception(trace),
            },
        )
        .await
    }

    // ==========================================
    // 内部步骤
    // ==========================================

    /// 计算并持久化一次状态转换
    async fn transition(&self, job: &ImportJob, transition: Transition) -> JobResult<ImportJob> {
        let expected = job.status;
        let name = transition.name();
        let next = apply_transition(job, job.variant, transition, Utc::now())?;
        self.jobs.save_transition(&next, expected).await?;
        debug!(job_id = %next.id, transition = name, from = %expected, to = %next.status, "状态转换");
        Ok(next)
    }

    fn validate(&self, decoded: DecodedFile) -> Validated {
        let validator = RecordValidator::new(self.schema.clone(), decoded.rows);
        if validator.is_valid() {
            Validated::Valid(validator.normalized_records())
        } else {
            Validated::Invalid(validator.error_report().clone())
        }
    }

    /// 记录校验失败（不抛出）
    async fn record_invalid(
        &self,
        job: ImportJob,
        report: ErrorReport,
        extra_headers: BTreeSet<String>,
    ) -> JobResult<ProcessReport> {
        warn!(
            job_id = %job.id,
            invalid_rows = report.invalid_row_count(),
            messages = report.message_count(),
            "数据校验失败"
        );
        for line in report.summary_lines() {
            debug!(job_id = %job.id, "{}", line);
        }

        let transition = match job.variant {
            JobVariant::TwoPhase => Transition::MarkFileErrors {
                report: report.clone(),
            },
            JobVariant::Simple => Transition::MarkErrors {
                errors: JobErrors::Validation(report.clone()),
            },
        };
        let job = self.transition(&job, transition).await?;

        Ok(ProcessReport {
            job,
            outcome: ProcessOutcome::ValidationFailed { report },
            extra_headers,
        })
    }

    /// 记录基础设施失败；catch_exceptions = false 时记录后上抛原错误
    async fn record_failure(
        &self,
        job: ImportJob,
        err: JobError,
        extra_headers: BTreeSet<String>,
    ) -> JobResult<ProcessReport> {
        let trace = error_trace(&err);
        error!(job_id = %job.id, status = %job.status, trace = %trace, "作业执行失败");

        let job = self
            .transition(
                &job,
                Transition::MarkErrors {
                    errors: JobErrors::Exception(trace.clone()),
                },
            )
            .await?;

        if !self.config.catch_exceptions {
            return Err(err);
        }

        Ok(ProcessReport {
            job,
            outcome: ProcessOutcome::InfraFailed { trace },
            extra_headers,
        })
    }
}

// ==========================================
// 批量导入作业引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 系统定位: 表格文件批量导入（校验 / 落库 / 错误报告 / 可恢复作业）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 状态机与流水线
pub mod engine;

// 导入层 - 解码与校验
pub mod importer;

// 配置层 - 作业配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 作业接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ImportJobStatus, JobVariant};

// 领域实体
pub use domain::{ImportJob, JobErrors, NormalizedRecord, RawRow, Record};

// 导入
pub use importer::{ErrorReport, FieldKind, RecordValidator, Schema, SchemaDefinition};

// 引擎
pub use engine::{ImportPipeline, JobError, ProcessOutcome, ProcessReport};

// 配置
pub use config::JobConfig;

// API
pub use api::{ApiError, ImportJobApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "批量导入作业引擎";

// ==========================================
// 批量导入作业引擎 - 配置层
// ==========================================
// 职责: 作业配置管理
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;
pub mod job_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use import_config_trait::ImportConfigReader;
pub use job_config::{JobConfig, DEFAULT_STALE_AFTER_SECS, MAX_STALE_AFTER_SECS};

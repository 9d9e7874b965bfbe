// ==========================================
// 批量导入作业引擎 - 命令行入口
// ==========================================
// 职责: 导入单个 CSV/Excel 文件并以 JSON 输出作业结果（开发工具）
// 用法: bulk-import-engine [db_path] <file> [job_type]
// 说明: Schema 读取自 config_kv（import_job/<job_type>/schema）
//       未配置时按文件表头生成宽松 Schema（全部可选文本字段）
// ==========================================

use anyhow::{bail, Context};
use bulk_import_engine::config::JobConfig;
use bulk_import_engine::importer::{FieldKind, FileDecoder, Schema, UniversalFileParser};
use bulk_import_engine::{logging, ImportJobApi, APP_NAME, VERSION};
use serde_json::json;
use std::path::{Path, PathBuf};

const DEFAULT_JOB_TYPE: &str = "default";

/// 默认数据库路径: BULK_IMPORT_DB_PATH > 用户数据目录 > 当前目录
fn default_db_path() -> String {
    if let Ok(path) = std::env::var("BULK_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./bulk_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("bulk-import-engine");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("bulk_import.db");
        }
    }
    path.to_string_lossy().to_string()
}

/// 以文件表头生成宽松 Schema（全部可选文本字段）
fn schema_from_headers(file: &str) -> anyhow::Result<Schema> {
    let decoded = UniversalFileParser
        .decode(Path::new(file))
        .with_context(|| format!("无法读取表头: {}", file))?;
    let mut builder = Schema::builder();
    for header in decoded.headers.iter().filter(|h| !h.is_empty()) {
        builder = builder.optional_field(header, header, FieldKind::Text);
    }
    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (db_path, file, job_type) = match args.as_slice() {
        [file] => (default_db_path(), file.clone(), DEFAULT_JOB_TYPE.to_string()),
        [db, file] => (db.clone(), file.clone(), DEFAULT_JOB_TYPE.to_string()),
        [db, file, job_type, ..] => (db.clone(), file.clone(), job_type.clone()),
        [] => bail!("用法: bulk-import-engine [db_path] <file> [job_type]"),
    };

    tracing::info!("{} v{}", APP_NAME, VERSION);
    tracing::info!(db_path = %db_path, file = %file, job_type = %job_type, "开始导入");

    let api = ImportJobApi::new(&db_path)?;

    if api.pipeline_for(&job_type).await.is_err() {
        tracing::warn!(job_type = %job_type, "未配置 Schema，按文件表头生成宽松 Schema");
        let config = JobConfig::new(job_type.clone());
        api.register_job_type(config, schema_from_headers(&file)?)?;
    }

    let job = api.create_job(&file, &job_type).await?;
    let saved = api.save_job(job).await?;
    let job = api.get_job(&saved.job.id).await?;

    let extra_headers = saved
        .process
        .as_ref()
        .map(|p| p.extra_headers.iter().cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    let output = json!({
        "job_id": job.id,
        "status": job.status,
        "is_valid": job.is_valid(),
        "errors": job.error_report(),
        "exceptions": job.exceptions(),
        "rows": job.data.as_ref().map(Vec::len),
        "extra_headers": extra_headers,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

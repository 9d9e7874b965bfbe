// ==========================================
// 导入流水线集成测试
// ==========================================
// 测试目标: SQLite 落地下的完整作业执行
// 覆盖: 成功 / 校验失败 / 解码失败 / 存储失败 / 两阶段 / 重试 / 并发 / 超时回收
// ==========================================

mod test_helpers;

use bulk_import_engine::domain::{ImportJobStatus, JobErrors, JobVariant};
use bulk_import_engine::engine::{JobError, ProcessOutcome};
use bulk_import_engine::logging;
use bulk_import_engine::repository::RecordStore;
use serde_json::json;
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use test_helpers::*;

#[tokio::test]
async fn test_valid_file_imports_and_succeeds() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_csv(&["Name,Age", "Bob,30"]);
    let pipeline = people_pipeline(&db_path, people_config(JobVariant::Simple));

    let saved = pipeline.save(pipeline.new_job(path_of(&csv))).await.unwrap();
    let report = saved.process.unwrap();

    assert_eq!(report.outcome, ProcessOutcome::Success { records: 1 });
    let job = pipeline.get_job(&report.job.id).await.unwrap();
    assert_eq!(job.status, ImportJobStatus::Success);
    assert!(job.is_valid());
    assert_eq!(
        serde_json::to_value(job.data.as_ref().unwrap()).unwrap(),
        json!([{"name": "Bob", "age": 30}])
    );
    assert!(job.started_on.unwrap() <= job.completed_on.unwrap());
    assert!(job.created_on <= job.started_on.unwrap());

    let (_, store) = open_shared(&db_path);
    assert_eq!(store.count("people").await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_rows_recorded_with_display_rows() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_csv(&["Name,Age", "Bob,30", "Eve,abc", ",7"]);
    let pipeline = people_pipeline(&db_path, people_config(JobVariant::Simple).with_catch_exceptions(false));

    let report = pipeline
        .save(pipeline.new_job(path_of(&csv)))
        .await
        .unwrap()
        .process
        .unwrap();

    assert!(matches!(report.outcome, ProcessOutcome::ValidationFailed { .. }));
    let job = pipeline.get_job(&report.job.id).await.unwrap();
    assert_eq!(job.status, ImportJobStatus::Errors);
    assert!(job.data.is_none());

    let errors = serde_json::to_value(job.error_report().unwrap()).unwrap();
    assert_eq!(
        errors,
        json!({
            "3": {"Age": ["not a number"]},
            "4": {"Name": ["This field is required."]}
        })
    );

    // 校验失败不落库
    let (_, store) = open_shared(&db_path);
    assert_eq!(store.count("people").await.unwrap(), 0);
}

#[tokio::test]
async fn test_error_rows_match_source_lines_after_blank_line() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_csv(&["Name,Age", "Bob,30", "", "Eve,abc"]);
    let pipeline = people_pipeline(&db_path, people_config(JobVariant::Simple));

    let report = pipeline
        .save(pipeline.new_job(path_of(&csv)))
        .await
        .unwrap()
        .process
        .unwrap();

    let job = pipeline.get_job(&report.job.id).await.unwrap();
    let errors = job.error_report().unwrap();
    // Eve 位于源文件第 4 行；第 3 行为空行
    assert_eq!(errors.row(4).unwrap()["Age"], vec!["not a number".to_string()]);
    assert_eq!(
        errors.row(3).unwrap()["Name"],
        vec!["This field is required.".to_string()]
    );
    assert!(errors.row(2).is_none());
}

#[tokio::test]
async fn test_terminal_jobs_hold_exactly_one_of_data_or_errors() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let good = write_csv(&["Name,Age", "Bob,30"]);
    let bad = write_csv(&["Name,Age", "Bob,x"]);
    let pipeline = people_pipeline(&db_path, people_config(JobVariant::Simple));

    for file in [&good, &bad] {
        let report = pipeline
            .save(pipeline.new_job(path_of(file)))
            .await
            .unwrap()
            .process
            .unwrap();
        let job = pipeline.get_job(&report.job.id).await.unwrap();

        assert!(job.status.is_terminal());
        assert!(job.data.is_some() != job.errors.is_some());
    }
}

#[tokio::test]
async fn test_corrupt_file_caught_and_recorded() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let mut xlsx = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
    xlsx.write_all(b"this is not a workbook").unwrap();
    let pipeline = people_pipeline(&db_path, people_config(JobVariant::Simple));

    let report = pipeline
        .save(pipeline.new_job(path_of(&xlsx)))
        .await
        .unwrap()
        .process
        .unwrap();

    let ProcessOutcome::InfraFailed { trace } = &report.outcome else {
        panic!("应为基础设施失败: {:?}", report.outcome);
    };
    assert!(trace.contains("Excel 解析失败"));

    let job = pipeline.get_job(&report.job.id).await.unwrap();
    assert_eq!(job.status, ImportJobStatus::Errors);
    assert!(!job.exceptions().unwrap().is_empty());
    assert!(job.completed_on.is_some());
}

#[tokio::test]
async fn test_corrupt_file_propagates_when_not_caught() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let mut xlsx = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
    xlsx.write_all(b"this is not a workbook").unwrap();
    let pipeline = people_pipeline(
        &db_path,
        people_config(JobVariant::Simple).with_catch_exceptions(false),
    );

    let job = pipeline.new_job(path_of(&xlsx));
    let job_id = job.id.clone();
    let err = pipeline.save(job).await.unwrap_err();

    assert!(matches!(err, JobError::Decode(_)));
    // 抛出前已记录
    let job = pipeline.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, ImportJobStatus::Errors);
    assert!(job.exceptions().unwrap().contains("Excel 解析失败"));
}

#[tokio::test]
async fn test_failed_start_leaves_job_untouched() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_csv(&["Name,Age", "Bob,30"]);
    let pipeline = people_pipeline(
        &db_path,
        people_config(JobVariant::Simple).with_auto_start(false),
    );

    let job = pipeline.save(pipeline.new_job(path_of(&csv))).await.unwrap().job;
    install_failure_trigger(&db_path, "fail_start", "NEW.status = 20", "import_job", "UPDATE");

    let err = pipeline.process(&job.id).await.unwrap_err();
    assert!(matches!(err, JobError::Repository(_)));

    assert_eq!(raw_status(&db_path, &job.id), 0);
    let stored = pipeline.get_job(&job.id).await.unwrap();
    assert_eq!(stored.status, ImportJobStatus::NotStarted);
    assert!(stored.started_on.is_none());
    assert!(stored.last_status_update.is_none());

    // 故障排除后可重新触发
    drop_trigger(&db_path, "fail_start");
    let report = pipeline.process(&job.id).await.unwrap();
    assert_eq!(report.job.status, ImportJobStatus::Success);
}

#[tokio::test]
async fn test_storage_failure_rolls_back_and_records_trace() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_csv(&["Name,Age", "Bob,30", "Eve,41"]);
    install_failure_trigger(
        &db_path,
        "fail_eve",
        "NEW.payload_json LIKE '%Eve%'",
        "imported_record",
        "INSERT",
    );
    let pipeline = people_pipeline(&db_path, people_config(JobVariant::Simple));

    let report = pipeline
        .save(pipeline.new_job(path_of(&csv)))
        .await
        .unwrap()
        .process
        .unwrap();

    assert!(matches!(&report.outcome, ProcessOutcome::InfraFailed { trace } if trace.contains("disk full")));
    let job = pipeline.get_job(&report.job.id).await.unwrap();
    assert_eq!(job.status, ImportJobStatus::Errors);
    assert!(job.data.is_none());

    // 整批回滚
    let (_, store) = open_shared(&db_path);
    assert_eq!(store.count("people").await.unwrap(), 0);
}

#[tokio::test]
async fn test_two_phase_success_and_file_errors() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let good = write_csv(&["Name,Age", "Bob,30"]);
    let bad = write_csv(&["Name,Age", "Bob,x"]);
    let pipeline = people_pipeline(&db_path, people_config(JobVariant::TwoPhase));

    let ok = pipeline.save(pipeline.new_job(path_of(&good))).await.unwrap().job;
    assert_eq!(ok.status, ImportJobStatus::Success);
    assert_eq!(ok.variant, JobVariant::TwoPhase);
    assert_eq!(ok.data.as_ref().map(Vec::len), Some(1));

    let failed = pipeline.save(pipeline.new_job(path_of(&bad))).await.unwrap().job;
    assert_eq!(failed.status, ImportJobStatus::FileErrors);
    assert!(failed.completed_on.is_some());
    assert!(matches!(failed.errors, Some(JobErrors::Validation(_))));

    // file_errors 可显式重试
    let retried = pipeline.retry(&failed.id).await.unwrap();
    assert_eq!(retried.job.status, ImportJobStatus::FileErrors);
}

#[tokio::test]
async fn test_retry_after_fix_and_success_is_final() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_csv(&["Name,Age", "Bob,abc"]);
    let pipeline = people_pipeline(&db_path, people_config(JobVariant::Simple));

    let job = pipeline.save(pipeline.new_job(path_of(&csv))).await.unwrap().job;
    assert_eq!(job.status, ImportJobStatus::Errors);

    // 修正源文件后重试
    std::fs::write(csv.path(), "Name,Age\nBob,31\n").unwrap();
    let retried = pipeline.retry(&job.id).await.unwrap();
    assert_eq!(retried.job.status, ImportJobStatus::Success);
    assert!(retried.job.errors.is_none());

    // success 不可重新开始
    let err = pipeline.retry(&job.id).await.unwrap_err();
    assert!(matches!(err, JobError::InvalidTransition(e) if e.from == ImportJobStatus::Success));
}

#[tokio::test]
async fn test_guard_violation_keeps_persisted_status() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_csv(&["Name,Age", "Bob,30"]);
    let pipeline = people_pipeline(&db_path, people_config(JobVariant::Simple));
    let job = pipeline.save(pipeline.new_job(path_of(&csv))).await.unwrap().job;
    assert_eq!(raw_status(&db_path, &job.id), 100);

    let err = pipeline.start(&job.id).await.unwrap_err();
    assert!(matches!(
        err,
        JobError::InvalidTransition(e) if e.from == ImportJobStatus::Success && e.to == ImportJobStatus::Started
    ));

    let err = pipeline.abort(&job.id, "cancelled").await.unwrap_err();
    assert!(matches!(
        err,
        JobError::InvalidTransition(e) if e.to == ImportJobStatus::Errors
    ));

    let stored = pipeline.get_job(&job.id).await.unwrap();
    assert_eq!(raw_status(&db_path, &job.id), 100);
    assert!(stored.data.is_some());
    assert!(stored.errors.is_none());
}

#[tokio::test]
async fn test_concurrent_process_of_same_job_runs_once() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_csv(&["Name,Age", "Bob,30"]);
    let pipeline = Arc::new(people_pipeline(
        &db_path,
        people_config(JobVariant::Simple).with_auto_start(false),
    ));
    let job = pipeline.save(pipeline.new_job(path_of(&csv))).await.unwrap().job;

    let a = tokio::spawn({
        let p = pipeline.clone();
        let id = job.id.clone();
        async move { p.process(&id).await }
    });
    let b = tokio::spawn({
        let p = pipeline.clone();
        let id = job.id.clone();
        async move { p.process(&id).await }
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(JobError::InvalidTransition(_)))));
}

#[tokio::test]
async fn test_process_many_isolates_failures() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let good = write_csv(&["Name,Age", "Bob,30"]);
    let other = write_csv(&["Name,Age", "Ann,22"]);
    let pipeline = people_pipeline(
        &db_path,
        people_config(JobVariant::Simple).with_auto_start(false),
    );

    let a = pipeline.save(pipeline.new_job(path_of(&good))).await.unwrap().job;
    let b = pipeline.save(pipeline.new_job("missing/file.csv")).await.unwrap().job;
    let c = pipeline.save(pipeline.new_job(path_of(&other))).await.unwrap().job;

    let results = pipeline
        .process_many(&[a.id.clone(), b.id.clone(), c.id.clone(), "unknown".to_string()])
        .await;

    assert_eq!(results.len(), 4);
    assert!(results[0].1.as_ref().unwrap().outcome.is_success());
    assert!(matches!(
        results[1].1.as_ref().unwrap().outcome,
        ProcessOutcome::InfraFailed { .. }
    ));
    assert!(results[2].1.as_ref().unwrap().outcome.is_success());
    assert!(matches!(results[3].1, Err(JobError::JobNotFound(_))));

    let (_, store) = open_shared(&db_path);
    assert_eq!(store.count("people").await.unwrap(), 2);
}

#[tokio::test]
async fn test_extra_headers_reported_but_ignored() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_csv(&["Name,Age,Nickname", "Bob,30,Bobby"]);
    let pipeline = people_pipeline(&db_path, people_config(JobVariant::Simple));

    let report = pipeline
        .save(pipeline.new_job(path_of(&csv)))
        .await
        .unwrap()
        .process
        .unwrap();

    assert_eq!(report.extra_headers, BTreeSet::from(["Nickname".to_string()]));
    assert!(report.outcome.is_success());
    assert_eq!(
        serde_json::to_value(report.job.data.unwrap()).unwrap(),
        json!([{"name": "Bob", "age": 30}])
    );
}

#[tokio::test]
async fn test_upsert_by_natural_key_across_jobs() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let first = write_csv(&["Name,Age", "Bob,30", "Ann,22"]);
    let second = write_csv(&["Name,Age", "Bob,31"]);
    let pipeline = people_pipeline(&db_path, people_config(JobVariant::Simple));

    pipeline.save(pipeline.new_job(path_of(&first))).await.unwrap();
    pipeline.save(pipeline.new_job(path_of(&second))).await.unwrap();

    let (_, store) = open_shared(&db_path);
    let rows = store.list("people").await.unwrap();
    assert_eq!(rows.len(), 2);
    let bob = rows.iter().find(|r| r["name"] == json!("Bob")).unwrap();
    assert_eq!(bob["age"], json!(31));
}

#[tokio::test]
async fn test_stale_job_found_and_recovered() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_csv(&["Name,Age", "Bob,30"]);
    let pipeline = people_pipeline(
        &db_path,
        people_config(JobVariant::Simple).with_auto_start(false),
    );
    let job = pipeline.save(pipeline.new_job(path_of(&csv))).await.unwrap().job;

    // 模拟执行中崩溃: 停留在 started
    pipeline.start(&job.id).await.unwrap();
    assert!(pipeline.find_stale_jobs(None).await.unwrap().is_empty());
    let err = pipeline.recover_stale_job(&job.id).await.unwrap_err();
    assert!(matches!(err, JobError::NotStale { .. }));

    backdate_job(&db_path, &job.id, 2 * 3600);
    let stale = pipeline.find_stale_jobs(None).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert!(stale[0].staleness(chrono::Utc::now()) >= chrono::Duration::hours(1));

    let recovered = pipeline.recover_stale_job(&job.id).await.unwrap();
    assert_eq!(recovered.status, ImportJobStatus::Errors);
    assert!(recovered.exceptions().unwrap().starts_with("stale job"));
    assert!(pipeline.find_stale_jobs(None).await.unwrap().is_empty());

    // 回收后可显式重试
    let report = pipeline.retry(&job.id).await.unwrap();
    assert_eq!(report.job.status, ImportJobStatus::Success);
}

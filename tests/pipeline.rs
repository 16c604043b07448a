//! End-to-end pipeline runs: artifact contract, audit completeness, and
//! single-flight admission.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use exeda::domain::ChangeAction;
use exeda::progress::RunStatus;
use exeda::{
    io, Orchestrator, RetryPolicy, RunOutcome, RunReport, StageContext, StageHandler, StageId,
    StageOutput,
};

/// CSV with 2 missing ages and 1 missing region over 10 rows.
const SURVEY_CSV: &str = "\
age,region
30,north
,north
40,
50,south
,north
60,south
35,north
45,south
55,north
25,south
";

fn write_csv(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("input.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, "{}", content).unwrap();
    path
}

async fn run_survey(dir: &TempDir) -> RunReport {
    let input = write_csv(dir, SURVEY_CSV);
    let dataset = io::load_csv(&input).unwrap();
    let orchestrator = Orchestrator::new(dir.path().join("out")).with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
    });
    match orchestrator.run(dataset).await.unwrap() {
        RunOutcome::Completed(report) => report,
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_full_run_produces_the_artifact_set() {
    let dir = TempDir::new().unwrap();
    let report = run_survey(&dir).await;
    let out = dir.path().join("out");

    for file in [
        "cleaned_data.csv",
        "report.md",
        "report.html",
        "status.json",
        "charts/dist_age.svg",
        "charts/missing_values.svg",
        "charts/impact_age.svg",
        "charts/importance_summary.svg",
        "models/trained_model.json",
    ] {
        assert!(out.join(file).exists(), "missing artifact {}", file);
    }
    assert_eq!(report.status.status, RunStatus::Completed);
    assert_eq!(report.status.progress, 100);

    // Every listed file actually exists under the output directory.
    for file in &report.files {
        assert!(out.join(file).exists(), "listed but absent: {}", file.display());
    }
}

#[tokio::test]
async fn test_audit_trail_accounts_for_every_repaired_cell() {
    let dir = TempDir::new().unwrap();
    let report = run_survey(&dir).await;

    // Original missing counts: age 2, region 1.
    let age_filled: usize = report
        .change_log
        .iter()
        .filter(|e| e.column == "age")
        .map(|e| e.affected_rows)
        .sum();
    let region_filled: usize = report
        .change_log
        .iter()
        .filter(|e| e.column == "region")
        .map(|e| e.affected_rows)
        .sum();
    assert_eq!(age_filled, 2);
    assert_eq!(region_filled, 1);

    // Cleaning handled everything, so the fallback pass added no entries.
    assert!(report
        .change_log
        .iter()
        .all(|e| e.action == ChangeAction::Impute));

    // Mean of the 8 observed ages is 42.5; both gaps got it.
    let cleaned = io::load_csv(&dir.path().join("out/cleaned_data.csv")).unwrap();
    assert_eq!(cleaned.total_missing(), 0);
    let age = cleaned.column("age").unwrap();
    assert_eq!(age.values[1], exeda::Value::Number(42.5));
    assert_eq!(age.values[4], exeda::Value::Number(42.5));
    let region = cleaned.column("region").unwrap();
    assert_eq!(region.values[2], exeda::Value::Text("north".into()));
}

#[tokio::test]
async fn test_report_renders_audit_and_sections() {
    let dir = TempDir::new().unwrap();
    run_survey(&dir).await;

    let md = std::fs::read_to_string(dir.path().join("out/report.md")).unwrap();
    assert!(md.contains("## Decision Audit Trail"));
    assert!(md.contains("| age | impute | mean |"));
    assert!(md.contains("charts/dist_age.svg"));

    let html = std::fs::read_to_string(dir.path().join("out/report.html")).unwrap();
    assert!(html.contains("<h2>Decision Audit Trail</h2>"));
}

#[tokio::test]
async fn test_binary_region_column_becomes_the_training_target() {
    let dir = TempDir::new().unwrap();
    run_survey(&dir).await;

    let raw = std::fs::read_to_string(dir.path().join("out/models/trained_model.json")).unwrap();
    let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(record["target"], "region");
    assert_eq!(record["problem_type"], "classification");
    assert_eq!(record["features"][0], "age");
}

#[tokio::test]
async fn test_second_run_request_is_rejected_while_tracker_is_busy() {
    let dir = TempDir::new().unwrap();
    let input = write_csv(&dir, SURVEY_CSV);
    let dataset = io::load_csv(&input).unwrap();
    let orchestrator = Orchestrator::new(dir.path().join("out"));

    // Simulate an in-flight run holding the tracker.
    assert!(orchestrator.tracker().try_start());

    let outcome = orchestrator.run(dataset).await.unwrap();
    assert!(matches!(outcome, RunOutcome::AlreadyRunning));
}

/// Sleeps long enough for a second caller to collide with the run.
struct SlowHandler;

#[async_trait]
impl StageHandler for SlowHandler {
    fn id(&self) -> StageId {
        StageId::Profiling
    }

    async fn execute(&self, _ctx: StageContext<'_>) -> Result<StageOutput> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(StageOutput {
            stage: StageId::Profiling,
            summary: "slow".to_string(),
            details: json!({}),
            files: Vec::new(),
        })
    }
}

#[tokio::test]
async fn test_concurrent_runs_admit_exactly_one() {
    let dir = TempDir::new().unwrap();
    let input = write_csv(&dir, SURVEY_CSV);
    let orchestrator = Arc::new(
        Orchestrator::new(dir.path().join("out")).with_handlers(vec![Box::new(SlowHandler)]),
    );

    let first = {
        let orchestrator = orchestrator.clone();
        let dataset = io::load_csv(&input).unwrap();
        tokio::spawn(async move { orchestrator.run(dataset).await })
    };

    // Wait until the first run actually holds the tracker.
    let tracker = orchestrator.tracker();
    while !tracker.is_running() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let dataset = io::load_csv(&input).unwrap();
    let second = orchestrator.run(dataset).await.unwrap();
    assert!(matches!(second, RunOutcome::AlreadyRunning));

    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, RunOutcome::Completed(_)));
}

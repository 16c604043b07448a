//! Dependency-ordered stage execution with retry and fallback repair.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::changelog::ChangeEntry;
use crate::domain::dataset::Dataset;
use crate::io;
use crate::pipeline::fallback::fallback_consistency_pass;
use crate::pipeline::retry::RetryPolicy;
use crate::progress::{ProgressTracker, StatusSnapshot};
use crate::stages::{builtin_handlers, StageContext, StageHandler, StageId, StageOutput};
use crate::store::{DatasetStore, ModelRegistry};

/// Result of asking the orchestrator to run.
#[derive(Debug)]
pub enum RunOutcome {
    /// Another run holds the tracker; nothing was started.
    AlreadyRunning,
    Completed(RunReport),
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub output_dir: PathBuf,
    /// Generated files, relative to `output_dir`.
    pub files: Vec<PathBuf>,
    pub change_log: Vec<ChangeEntry>,
    pub status: StatusSnapshot,
}

/// Runs the fixed stage sequence over per-run stores. One instance may be
/// shared (behind `Arc`) between callers; the tracker enforces that only a
/// single run is in flight.
pub struct Orchestrator {
    handlers: Vec<Box<dyn StageHandler>>,
    tracker: ProgressTracker,
    retry: RetryPolicy,
    output_dir: PathBuf,
    target: Option<String>,
}

impl Orchestrator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            handlers: builtin_handlers(),
            tracker: ProgressTracker::new(),
            retry: RetryPolicy::default(),
            output_dir: output_dir.into(),
            target: None,
        }
    }

    /// Replace the handler set (must already be in execution order).
    pub fn with_handlers(mut self, handlers: Vec<Box<dyn StageHandler>>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    /// Shared handle for pollers; clones observe live run state.
    pub fn tracker(&self) -> ProgressTracker {
        self.tracker.clone()
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    /// Execute the full pipeline over `dataset`. Refuses to overlap with an
    /// in-flight run; any stage failure aborts the remaining stages and
    /// leaves the tracker in the error state.
    #[instrument(skip(self, dataset))]
    pub async fn run(&self, dataset: Dataset) -> Result<RunOutcome> {
        if !self.tracker.try_start() {
            info!("run request rejected, another run is in flight");
            return Ok(RunOutcome::AlreadyRunning);
        }
        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, output = %self.output_dir.display(), "run started");

        match self.execute_run(run_id, dataset).await {
            Ok(report) => Ok(RunOutcome::Completed(report)),
            Err(err) => {
                let message = format!("{:#}", err);
                error!(run_id = %run_id, error = %message, "run failed");
                self.tracker.error(&message);
                if let Err(persist_err) = self.persist_status().await {
                    warn!(error = %persist_err, "could not persist failure status");
                }
                Err(err)
            }
        }
    }

    async fn execute_run(&self, run_id: Uuid, dataset: Dataset) -> Result<RunReport> {
        let mut data = DatasetStore::new();
        data.initialize(dataset)?;
        let mut models = ModelRegistry::new();

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| {
                format!("creating output directory {}", self.output_dir.display())
            })?;
        self.persist_status().await?;

        let mut outputs: HashMap<StageId, StageOutput> = HashMap::new();
        let mut files: Vec<PathBuf> = Vec::new();

        for handler in &self.handlers {
            let stage = handler.id();
            self.tracker.start_stage(stage);
            self.persist_status().await?;

            let output = self
                .run_stage(handler.as_ref(), &mut data, &mut models, &outputs)
                .await?;

            self.tracker.complete_stage(stage);
            self.tracker
                .log_activity(stage.as_str(), output.summary.clone(), "completed");
            self.persist_status().await?;
            files.extend(output.files.iter().cloned());
            outputs.insert(stage, output);
        }

        let repaired = fallback_consistency_pass(&mut data)?;
        if repaired > 0 {
            self.tracker.log_activity(
                "fallback",
                format!("consistency pass repaired {} columns", repaired),
                "completed",
            );
        }

        let export_path = self.output_dir.join("cleaned_data.csv");
        io::write_csv(data.current()?, &export_path)?;
        files.insert(0, PathBuf::from("cleaned_data.csv"));

        self.tracker.complete();
        self.persist_status().await?;
        info!(run_id = %run_id, files = files.len(), "run completed");

        Ok(RunReport {
            run_id,
            output_dir: self.output_dir.clone(),
            files,
            change_log: data.change_log().to_vec(),
            status: self.tracker.snapshot(),
        })
    }

    /// One stage with stage-scoped retry. The context is rebuilt for every
    /// attempt so a retried handler starts from current state.
    async fn run_stage(
        &self,
        handler: &dyn StageHandler,
        data: &mut DatasetStore,
        models: &mut ModelRegistry,
        outputs: &HashMap<StageId, StageOutput>,
    ) -> Result<StageOutput> {
        let stage = handler.id();
        let mut attempt: u32 = 1;
        loop {
            let deps: HashMap<StageId, &StageOutput> = stage
                .required_context()
                .iter()
                .filter_map(|dep| outputs.get(dep).map(|o| (*dep, o)))
                .collect();
            let ctx = StageContext {
                data: &mut *data,
                models: &mut *models,
                output_dir: &self.output_dir,
                target_override: self.target.as_deref(),
                deps,
            };

            match handler.execute(ctx).await {
                Ok(output) => {
                    info!(stage = %stage, attempt, "stage completed");
                    return Ok(output);
                }
                Err(err) => {
                    let message = format!("{:#}", err);
                    if self.retry.should_retry(attempt, &message) {
                        let delay = self.retry.delay_for_attempt(attempt);
                        warn!(
                            stage = %stage,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %message,
                            "transient stage failure, will retry"
                        );
                        self.tracker.log_activity(
                            stage.as_str(),
                            format!("attempt {} failed: {}", attempt, message),
                            "retrying",
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    } else {
                        return Err(err.context(format!(
                            "stage '{}' failed after {} attempt(s)",
                            stage, attempt
                        )));
                    }
                }
            }
        }
    }

    async fn persist_status(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| {
                format!("creating output directory {}", self.output_dir.display())
            })?;
        let snapshot = self.tracker.snapshot();
        let payload =
            serde_json::to_vec_pretty(&snapshot).context("serializing status snapshot")?;
        let path = self.output_dir.join("status.json");
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

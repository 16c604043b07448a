//! Stage identities, the handler trait, and the built-in handlers.
//!
//! The pipeline topology is a fixed linear order with declared dependencies:
//! every stage runs once, after all of its dependencies, and receives their
//! outputs through its context. Handlers are swappable behind `StageHandler`;
//! the built-ins are deterministic implementations of the analysis contracts.

pub mod cleaner;
pub mod explainer;
pub mod profiler;
pub mod recommender;
pub mod reporter;
pub mod statistician;
pub mod trainer;
pub mod visualizer;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::{DatasetStore, ModelRegistry};

/// The eight pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Profiling,
    Cleaning,
    Visualization,
    Statistics,
    Recommendation,
    Training,
    Explainability,
    Report,
}

impl StageId {
    /// Execution order. Fixed; not configurable.
    pub const ALL: [StageId; 8] = [
        StageId::Profiling,
        StageId::Cleaning,
        StageId::Visualization,
        StageId::Statistics,
        StageId::Recommendation,
        StageId::Training,
        StageId::Explainability,
        StageId::Report,
    ];

    /// Stages whose outputs this stage receives in its context.
    pub fn required_context(&self) -> &'static [StageId] {
        match self {
            StageId::Profiling => &[],
            StageId::Cleaning => &[StageId::Profiling],
            StageId::Visualization => &[StageId::Cleaning],
            StageId::Statistics => &[StageId::Cleaning],
            StageId::Recommendation => &[StageId::Profiling, StageId::Statistics],
            StageId::Training => &[StageId::Recommendation],
            StageId::Explainability => &[StageId::Training],
            StageId::Report => &[
                StageId::Profiling,
                StageId::Cleaning,
                StageId::Visualization,
                StageId::Statistics,
                StageId::Recommendation,
                StageId::Training,
                StageId::Explainability,
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Profiling => "profiling",
            StageId::Cleaning => "cleaning",
            StageId::Visualization => "visualization",
            StageId::Statistics => "statistics",
            StageId::Recommendation => "recommendation",
            StageId::Training => "training",
            StageId::Explainability => "explainability",
            StageId::Report => "report",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StageId::Profiling => "Data Profiling",
            StageId::Cleaning => "Data Cleaning",
            StageId::Visualization => "Visualization",
            StageId::Statistics => "Statistical Analysis",
            StageId::Recommendation => "Model Recommendation",
            StageId::Training => "Model Training",
            StageId::Explainability => "Explainability",
            StageId::Report => "Report Generation",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a completed stage hands to its dependents and to the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage: StageId,
    pub summary: String,
    pub details: serde_json::Value,
    /// Files the stage wrote, relative to the output directory.
    pub files: Vec<PathBuf>,
}

/// Everything a handler may touch while executing.
///
/// Rebuilt for every invocation (including retries) so a handler never sees
/// stale dependency outputs.
pub struct StageContext<'a> {
    pub data: &'a mut DatasetStore,
    pub models: &'a mut ModelRegistry,
    /// Run output directory; `charts/` and `models/` live beneath it.
    pub output_dir: &'a std::path::Path,
    /// Target column forced by the caller, if any.
    pub target_override: Option<&'a str>,
    /// Outputs of this stage's declared dependencies.
    pub deps: HashMap<StageId, &'a StageOutput>,
}

impl<'a> StageContext<'a> {
    pub fn dep(&self, stage: StageId) -> Option<&StageOutput> {
        self.deps.get(&stage).copied()
    }

    pub fn charts_dir(&self) -> PathBuf {
        self.output_dir.join("charts")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.output_dir.join("models")
    }
}

/// One unit of pipeline work.
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn id(&self) -> StageId;

    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput>;
}

/// The built-in handler set, in execution order.
pub fn builtin_handlers() -> Vec<Box<dyn StageHandler>> {
    vec![
        Box::new(profiler::Profiler),
        Box::new(cleaner::Cleaner),
        Box::new(visualizer::Visualizer),
        Box::new(statistician::Statistician),
        Box::new(recommender::Recommender),
        Box::new(trainer::Trainer),
        Box::new(explainer::Explainer),
        Box::new(reporter::Reporter),
    ]
}

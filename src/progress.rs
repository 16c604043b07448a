//! Lock-protected run progress state machine.
//!
//! One tracker instance is shared between the orchestrator and any poller
//! (CLI status, tests). All reads and writes serialize under a single mutex;
//! `snapshot()` returns an owned, internally consistent copy.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stages::StageId;

/// Percentage window each stage occupies while active.
pub const STAGE_BOUNDS: [(StageId, u8, u8); 8] = [
    (StageId::Profiling, 10, 20),
    (StageId::Cleaning, 20, 35),
    (StageId::Visualization, 35, 50),
    (StageId::Statistics, 50, 60),
    (StageId::Recommendation, 60, 65),
    (StageId::Training, 65, 75),
    (StageId::Explainability, 75, 85),
    (StageId::Report, 85, 100),
];

/// Progress value set by `start()` before any stage begins.
const STARTING_PROGRESS: u8 = 5;

/// Newest-first activity entries kept per run.
const ACTIVITY_CAP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub actor: String,
    pub action: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatusEntry {
    pub id: StageId,
    pub name: String,
    pub state: StageState,
    pub progress_start: u8,
    pub progress_end: u8,
}

/// Owned view of the tracker at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: RunStatus,
    pub message: String,
    pub progress: u8,
    pub current_stage: Option<StageId>,
    pub stages: Vec<StageStatusEntry>,
    pub activity_log: Vec<ActivityEntry>,
}

#[derive(Debug)]
struct TrackerState {
    status: RunStatus,
    message: String,
    progress: u8,
    current_stage: Option<StageId>,
    stage_states: [StageState; 8],
    activity_log: Vec<ActivityEntry>,
}

impl TrackerState {
    fn fresh() -> Self {
        Self {
            status: RunStatus::Idle,
            message: String::new(),
            progress: 0,
            current_stage: None,
            stage_states: [StageState::Pending; 8],
            activity_log: Vec::new(),
        }
    }
}

fn stage_index(id: StageId) -> usize {
    StageId::ALL
        .iter()
        .position(|s| *s == id)
        .unwrap_or_default()
}

/// Shared, mutex-serialized progress tracker. Cloning shares state.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    inner: Arc<Mutex<TrackerState>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerState::fresh())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.lock().status == RunStatus::Running
    }

    /// Begin a run: idle (or terminal) state becomes running, the activity
    /// log is cleared, and progress jumps to the starting value.
    pub fn start(&self) {
        let mut state = self.lock();
        *state = TrackerState::fresh();
        state.status = RunStatus::Running;
        state.message = "Analysis started".to_string();
        state.progress = STARTING_PROGRESS;
    }

    /// Atomic check-and-start: begins a run unless one is already in
    /// progress. Returns false when a run holds the tracker.
    pub fn try_start(&self) -> bool {
        let mut state = self.lock();
        if state.status == RunStatus::Running {
            return false;
        }
        *state = TrackerState::fresh();
        state.status = RunStatus::Running;
        state.message = "Analysis started".to_string();
        state.progress = STARTING_PROGRESS;
        true
    }

    /// Mark a stage active and move progress to its window start.
    /// Ignored unless the run is in progress.
    pub fn start_stage(&self, id: StageId) {
        let mut state = self.lock();
        if state.status != RunStatus::Running {
            return;
        }
        state.current_stage = Some(id);
        state.stage_states[stage_index(id)] = StageState::Active;
        let (_, start, _) = STAGE_BOUNDS[stage_index(id)];
        state.progress = state.progress.max(start);
        state.message = format!("Running {}", id.display_name());
    }

    /// Mark a stage finished and move progress to its window end.
    /// Does not advance to the next stage.
    pub fn complete_stage(&self, id: StageId) {
        let mut state = self.lock();
        if state.status != RunStatus::Running {
            return;
        }
        state.stage_states[stage_index(id)] = StageState::Completed;
        let (_, _, end) = STAGE_BOUNDS[stage_index(id)];
        state.progress = state.progress.max(end);
    }

    /// Prepend one activity entry, dropping the oldest past the cap.
    pub fn log_activity(
        &self,
        actor: impl Into<String>,
        action: impl Into<String>,
        status: impl Into<String>,
    ) {
        let mut state = self.lock();
        state.activity_log.insert(
            0,
            ActivityEntry {
                actor: actor.into(),
                action: action.into(),
                status: status.into(),
                timestamp: Utc::now(),
            },
        );
        state.activity_log.truncate(ACTIVITY_CAP);
    }

    /// Terminal success. Forces every stage to completed and progress to
    /// 100. Safe to call more than once.
    pub fn complete(&self) {
        let mut state = self.lock();
        state.status = RunStatus::Completed;
        state.stage_states = [StageState::Completed; 8];
        state.current_stage = None;
        state.progress = 100;
        state.message = "Analysis complete".to_string();
    }

    /// Terminal failure from any state. Progress resets so pollers see the
    /// run did not finish.
    pub fn error(&self, message: impl Into<String>) {
        let mut state = self.lock();
        state.status = RunStatus::Error;
        state.progress = 0;
        state.current_stage = None;
        state.message = message.into();
    }

    /// Back to idle; a new run may begin.
    pub fn reset(&self) {
        let mut state = self.lock();
        *state = TrackerState::fresh();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.lock();
        let stages = STAGE_BOUNDS
            .iter()
            .enumerate()
            .map(|(i, (id, start, end))| StageStatusEntry {
                id: *id,
                name: id.display_name().to_string(),
                state: state.stage_states[i],
                progress_start: *start,
                progress_end: *end,
            })
            .collect();
        StatusSnapshot {
            status: state.status,
            message: state.message.clone(),
            progress: state.progress,
            current_stage: state.current_stage,
            stages,
            activity_log: state.activity_log.clone(),
        }
    }
}

//! Evaluation log
//!
//! Kept for later inspection when a pipeline runs with `log_eval` enabled.
//! Recording never changes what the evaluator does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of one evaluation run.
///
/// ```text
/// Ready → Running(i) → Running(i+1) | StoppedEarly | Failed | Completed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Ready,
    Running { step: String },
    StoppedEarly { step: String },
    Failed { step: String },
    Completed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::StoppedEarly { .. } | RunState::Failed { .. } | RunState::Completed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    /// Completed and raised the early-stop flag.
    StoppedEarly,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub index: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalLog {
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RunState,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl EvalLog {
    pub fn start(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            started_at: Utc::now(),
            finished_at: None,
            state: RunState::Ready,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, record: StepRecord) {
        self.steps.push(record);
    }

    pub fn finish(&mut self, state: RunState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }

    /// Names of the steps that were invoked, in order.
    pub fn executed_steps(&self) -> Vec<&str> {
        self.steps.iter().map(|r| r.step.as_str()).collect()
    }

    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.status == StepStatus::Failed)
    }

    pub fn total_latency_ms(&self) -> u64 {
        self.steps.iter().map(|r| r.latency_ms).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

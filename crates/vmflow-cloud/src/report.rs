//! Execution results and the provisioning report

use crate::error::ErrorKind;
use crate::resource::{Environment, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: ErrorKind,

    pub message: String,

    /// Underlying kind when `kind` is a composite such as `PartialRebind`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<ErrorKind>,

    /// Number of attempts made before giving up
    pub attempts: u32,
}

/// Outcome of a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionResult {
    Created,
    AlreadyExists,
    Failed(StepFailure),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, ExecutionResult::Failed(_))
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionResult::Created => write!(f, "created"),
            ExecutionResult::AlreadyExists => write!(f, "already exists"),
            ExecutionResult::Failed(failure) => write!(f, "failed ({})", failure.kind),
        }
    }
}

/// Recorded result of one plan step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position in the plan
    pub index: usize,
    pub id: String,
    pub kind: ResourceKind,
    pub result: ExecutionResult,
    pub duration_ms: u64,
}

/// Why a run stopped before completing the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HaltReason {
    Failed { kind: ErrorKind },
    Cancelled,
}

/// State of a provisioner run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Init,
    Running { step: usize },
    Succeeded,
    /// `step` equals the plan length when the final address query failed
    Halted { step: usize, reason: HaltReason },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Halted { .. })
    }
}

/// Aggregate result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningReport {
    pub environment: Environment,

    pub steps: Vec<StepRecord>,

    pub state: RunState,

    /// Externally reachable address, only set when the run succeeded
    pub address: Option<String>,

    /// Message describing why the run halted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,

    pub duration_ms: u64,
}

impl ProvisioningReport {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Succeeded
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.state,
            RunState::Halted {
                reason: HaltReason::Cancelled,
                ..
            }
        )
    }

    pub fn result_for(&self, id: &str) -> Option<&ExecutionResult> {
        self.steps.iter().find(|s| s.id == id).map(|s| &s.result)
    }

    /// The failed step id and its error kind, if the run halted on a failure
    ///
    /// A failed address lookup after the last step is reported against the
    /// last step.
    pub fn failed_step(&self) -> Option<(&str, ErrorKind)> {
        let recorded = self.steps.iter().find_map(|s| match &s.result {
            ExecutionResult::Failed(failure) => Some((s.id.as_str(), failure.kind)),
            _ => None,
        });
        if recorded.is_some() {
            return recorded;
        }

        match &self.state {
            RunState::Halted {
                reason: HaltReason::Failed { kind },
                ..
            } => Some((self.steps.last().map_or("", |s| s.id.as_str()), *kind)),
            _ => None,
        }
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for step in &self.steps {
            match step.result {
                ExecutionResult::Created => summary.created += 1,
                ExecutionResult::AlreadyExists => summary.already_exists += 1,
                ExecutionResult::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Counts of step outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub created: usize,
    pub already_exists: usize,
    pub failed: usize,
}

impl std::fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} already existed, {} failed",
            self.created, self.already_exists, self.failed
        )
    }
}

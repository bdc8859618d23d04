//! Evaluation outcomes and grade reports

use serde::{Deserialize, Serialize};

use crate::constants::GRADE_MARKER;
use crate::error::GradeError;

/// Execution state of one submission
///
/// `Pending -> Precompiling -> Evaluating -> {Succeeded, Failed, TimedOut}`,
/// and `Succeeded -> DistributedTesting -> {DistSucceeded, DistFailed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Precompiling,
    Evaluating,
    Succeeded,
    Failed,
    TimedOut,
    DistributedTesting,
    DistSucceeded,
    DistFailed,
}

impl ExecutionState {
    /// Whether the state ends a submission's execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::DistSucceeded | Self::DistFailed
        )
    }

    /// Whether the state counts as a pass
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::DistSucceeded)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Precompiling => write!(f, "precompiling"),
            Self::Evaluating => write!(f, "evaluating"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::DistributedTesting => write!(f, "distributed_testing"),
            Self::DistSucceeded => write!(f, "dist_succeeded"),
            Self::DistFailed => write!(f, "dist_failed"),
        }
    }
}

/// Outcome of running the evaluation command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    /// Combined stdout/stderr, plus any timeout notice and distributed output
    pub output: Vec<u8>,
    /// Exit code of the evaluation command; meaningless when `timed_out`
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub state: ExecutionState,
}

impl EvaluationResult {
    pub fn passed(&self) -> bool {
        self.state.is_success()
    }
}

/// Which kind of report a submission produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Success,
    Failure,
    InfrastructureError,
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::InfrastructureError => write!(f, "infrastructure_error"),
        }
    }
}

/// Final text returned to the student
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeReport {
    pub kind: ReportKind,
    pub text: String,
}

impl GradeReport {
    /// Report built from captured process output
    pub fn from_evaluation(result: &EvaluationResult) -> Self {
        let kind = if result.passed() {
            ReportKind::Success
        } else {
            ReportKind::Failure
        };
        Self {
            kind,
            text: String::from_utf8_lossy(&result.output).into_owned(),
        }
    }

    /// Report for a submission whose grading failed before producing output.
    /// Only the error's display text reaches the student.
    ///
    /// A failed precommand (the submission's build) is a `Failure`.
    pub fn from_error(error: &GradeError) -> Self {
        let kind = match error {
            GradeError::Precommand(_) => ReportKind::Failure,
            _ => ReportKind::InfrastructureError,
        };
        Self {
            kind,
            text: error.to_string(),
        }
    }

    /// Comment body posted back to the LMS: the grade marker on its own
    /// line, then the report with NUL bytes escaped.
    pub fn comment_text(&self) -> String {
        format!("{}\n{}", GRADE_MARKER, self.text.replace('\0', "\\0"))
    }
}

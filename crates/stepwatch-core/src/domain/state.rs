//! State - run とステップの状態
//!
//! # 3 種類の状態
//! - `OverallStatus`: クライアントが見ている run 全体の状態
//! - `StepStatus`: 各ステップの状態
//! - `WorkflowStatus`: サーバが報告する run の状態（履歴 API / workflow_complete）

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// OverallStatus は snapshot 全体の状態
///
/// # 状態遷移
/// - idle → running: run 開始（または新しい run の最初のイベント）
/// - running → completed: workflow_complete イベント
/// - running → failed: StreamFailure（ドメインイベントからは遷移しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Idle => "idle",
            OverallStatus::Running => "running",
            OverallStatus::Completed => "completed",
            OverallStatus::Failed => "failed",
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, OverallStatus::Completed | OverallStatus::Failed)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one step within a run.
///
/// State transitions:
/// - Pending -> Running (step_start)
/// - Pending | Running -> Completed | Failed | Skipped | Partial (step_complete)
///
/// Completed, Failed and Skipped are terminal: nothing changes them again
/// within the same run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Partial,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Partial => "partial",
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// Can a step_complete event report this status?
    pub fn is_outcome(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped | StepStatus::Partial
        )
    }

    /// Does this step still accept a completion?
    pub fn accepts_completion(self) -> bool {
        matches!(self, StepStatus::Pending | StepStatus::Running)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "skipped" => Ok(StepStatus::Skipped),
            "partial" => Ok(StepStatus::Partial),
            other => Err(format!("unknown step status: {other}")),
        }
    }
}

/// Run status as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Partial,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Partial => "partial",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(WorkflowStatus::Running),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            "partial" => Ok(WorkflowStatus::Partial),
            other => Err(format!("unknown workflow status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::pending(StepStatus::Pending, false, false, true)]
    #[case::running(StepStatus::Running, false, false, true)]
    #[case::completed(StepStatus::Completed, true, true, false)]
    #[case::failed(StepStatus::Failed, true, true, false)]
    #[case::skipped(StepStatus::Skipped, true, true, false)]
    #[case::partial(StepStatus::Partial, false, true, false)]
    fn step_status_classification(
        #[case] status: StepStatus,
        #[case] terminal: bool,
        #[case] outcome: bool,
        #[case] accepts_completion: bool,
    ) {
        assert_eq!(status.is_terminal(), terminal);
        assert_eq!(status.is_outcome(), outcome);
        assert_eq!(status.accepts_completion(), accepts_completion);
        assert_eq!(status.as_str().parse::<StepStatus>().unwrap(), status);
    }

    #[test]
    fn overall_status_defaults_to_idle() {
        assert_eq!(OverallStatus::default(), OverallStatus::Idle);
        assert!(!OverallStatus::Running.is_finished());
        assert!(OverallStatus::Failed.is_finished());
    }

    #[test]
    fn workflow_status_uses_snake_case_on_the_wire() {
        let status: WorkflowStatus = serde_json::from_str("\"partial\"").unwrap();
        assert_eq!(status, WorkflowStatus::Partial);
        assert_eq!("failed".parse::<WorkflowStatus>(), Ok(WorkflowStatus::Failed));
        assert!("done".parse::<WorkflowStatus>().is_err());
    }
}

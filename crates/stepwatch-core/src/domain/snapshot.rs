//! WorkflowSnapshot: the client-side view of one run.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::ids::{SessionId, WorkflowId};
use super::state::{OverallStatus, StepStatus, WorkflowStatus};
use super::step::{StepMap, StepName};

/// ある時点の run の状態
///
/// 設計:
/// - run ごとに新しく作る（`WorkflowSnapshot::begin`）
/// - 変更するのは reducer とタイマーの tick だけ（`SnapshotStore` 経由）
/// - `session` で古い書き込みを見分ける
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WorkflowSnapshot {
    #[serde(skip)]
    pub session: Option<SessionId>,

    /// サーバが割り当てた run id（ストリームで届いてから）
    pub id: Option<WorkflowId>,

    pub overall_status: OverallStatus,

    /// 最後に開始したステップ
    pub current_step: Option<StepName>,

    pub step_status: StepMap<StepStatus>,

    pub elapsed_seconds: StepMap<u64>,

    /// ステップ完了時に 1 度だけ設定される
    pub step_results: BTreeMap<StepName, Value>,

    /// workflow_complete が運んできた run の status
    pub reported_status: Option<WorkflowStatus>,

    /// 最後の `error` イベントのメッセージ
    pub server_error: Option<String>,
}

impl WorkflowSnapshot {
    /// run 開始前の snapshot
    pub fn idle() -> Self {
        Self::default()
    }

    /// 新しい run 用の snapshot（すべてリセット、status は running）
    pub fn begin(session: SessionId) -> Self {
        Self {
            session: Some(session),
            overall_status: OverallStatus::Running,
            ..Self::default()
        }
    }

    pub fn status_of(&self, step: StepName) -> StepStatus {
        *self.step_status.get(step)
    }

    pub fn elapsed(&self, step: StepName) -> u64 {
        *self.elapsed_seconds.get(step)
    }

    pub fn result(&self, step: StepName) -> Option<&Value> {
        self.step_results.get(&step)
    }

    pub fn running_steps(&self) -> Vec<StepName> {
        self.step_status
            .iter()
            .filter(|(_, status)| **status == StepStatus::Running)
            .map(|(step, _)| step)
            .collect()
    }

    /// ステップのカウンタを 1 秒進める
    ///
    /// running のステップだけが進みます。変更があったかどうかを返します。
    pub fn tick(&mut self, step: StepName) -> bool {
        if self.status_of(step) != StepStatus::Running {
            return false;
        }
        *self.elapsed_seconds.get_mut(step) += 1;
        true
    }

    /// ストリーム失敗で run を終える
    ///
    /// すでに終わっていた run なら false を返します。
    pub fn mark_failed(&mut self) -> bool {
        if self.overall_status.is_finished() {
            return false;
        }
        self.overall_status = OverallStatus::Failed;
        true
    }
}

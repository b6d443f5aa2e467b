//! Reducer model: next snapshot for one incoming event.
//!
//! This module defines the Transition type (next snapshot plus the timer
//! effects to carry out) and the Reducer trait (how to compute it).

use tracing::debug;

use super::events::{DomainEvent, StepCompletion, StreamEvent};
use super::snapshot::WorkflowSnapshot;
use super::state::{OverallStatus, StepStatus};
use super::step::StepName;

/// 遷移が要求するタイマー操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEffect {
    /// ステップの tick を開始（または再開）
    Start(StepName),

    Stop(StepName),

    StopAll,
}

/// 1 イベントを適用した結果
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub snapshot: WorkflowSnapshot,
    pub effects: Vec<TimerEffect>,
}

impl Transition {
    fn unchanged(snapshot: WorkflowSnapshot) -> Self {
        Self {
            snapshot,
            effects: Vec::new(),
        }
    }
}

/// 完了したステップの経過秒をどこから取るか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationSource {
    /// サーバの `duration_ms` があれば tick した値より優先する
    #[default]
    PreferServer,

    /// 最後に tick した値のまま
    ClientTicks,
}

/// 次の snapshot を計算する trait
///
/// Reducer は純粋関数です（副作用なし）。現在の snapshot と 1 イベントから
/// 次の snapshot とタイマー効果を返し、効果そのものは実行しません。
/// タイマーを持つのは呼び出し側（StreamRunner）です。
pub trait Reducer: Send + Sync {
    fn reduce(&self, snapshot: &WorkflowSnapshot, event: &StreamEvent) -> Transition;
}

/// デフォルトの Reducer
///
/// 遷移:
/// - pending + StepStart -> running; start timer
/// - running + StepStart -> running; restart timer（サーバがステップに再突入した）
/// - pending | running + StepComplete(status) -> status; stop timer; record result
/// - any + WorkflowComplete -> overall completed; stop all timers
///
/// それ以外（不完全な completion を含む）は snapshot を変えません。panic しません。
#[derive(Debug, Clone, Default)]
pub struct WorkflowReducer {
    duration: DurationSource,
}

impl WorkflowReducer {
    pub fn new(duration: DurationSource) -> Self {
        Self { duration }
    }

    fn step_start(&self, next: &mut WorkflowSnapshot, step: StepName) -> Vec<TimerEffect> {
        match next.status_of(step) {
            StepStatus::Pending => {
                next.step_status.set(step, StepStatus::Running);
                next.current_step = Some(step);
                vec![TimerEffect::Start(step)]
            }
            StepStatus::Running => {
                next.current_step = Some(step);
                vec![TimerEffect::Start(step)]
            }
            status => {
                debug!(%step, %status, "step_start for a finished step ignored");
                Vec::new()
            }
        }
    }

    fn step_complete(
        &self,
        next: &mut WorkflowSnapshot,
        completion: &StepCompletion,
    ) -> Vec<TimerEffect> {
        let step = completion.step;
        let current = next.status_of(step);
        if !current.accepts_completion() {
            debug!(%step, status = %current, "step_complete for a finished step ignored");
            return Vec::new();
        }

        let (Some(status), Some(payload)) = (completion.status, completion.payload.as_ref()) else {
            debug!(%step, "incomplete step_complete ignored");
            return Vec::new();
        };
        if !status.is_outcome() {
            debug!(%step, %status, "step_complete with a non-final status ignored");
            return Vec::new();
        }

        next.step_status.set(step, status);
        if self.duration == DurationSource::PreferServer
            && let Some(ms) = payload.duration_ms
        {
            next.elapsed_seconds.set(step, seconds_from_millis(ms));
        }
        next.step_results.insert(step, payload.output.clone());

        vec![TimerEffect::Stop(step)]
    }
}

impl Reducer for WorkflowReducer {
    fn reduce(&self, snapshot: &WorkflowSnapshot, event: &StreamEvent) -> Transition {
        let mut next = snapshot.clone();

        if next.overall_status == OverallStatus::Idle {
            next.overall_status = OverallStatus::Running;
        }
        if next.id.is_none() {
            next.id = event.workflow_id.clone();
        }

        let effects = match &event.kind {
            DomainEvent::StepStart { step } => self.step_start(&mut next, *step),
            DomainEvent::StepComplete(completion) => self.step_complete(&mut next, completion),
            DomainEvent::WorkflowComplete { status } => {
                if next.overall_status != OverallStatus::Failed {
                    next.overall_status = OverallStatus::Completed;
                }
                next.reported_status = *status;
                vec![TimerEffect::StopAll]
            }
            DomainEvent::Error { message } => {
                next.server_error = Some(message.clone());
                Vec::new()
            }
            DomainEvent::Ignored(reason) => {
                debug!(?reason, "event ignored");
                return Transition::unchanged(next);
            }
        };

        Transition {
            snapshot: next,
            effects,
        }
    }
}

/// `round(ms / 1000)`（四捨五入）。負の値と非有限値は 0 とみなす
fn seconds_from_millis(ms: f64) -> u64 {
    if !ms.is_finite() || ms <= 0.0 {
        return 0;
    }
    (ms / 1000.0).round() as u64
}

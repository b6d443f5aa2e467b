//! Events - ストリームから復号されたドメインイベント
//!
//! # イベント種類
//! - StepStart
//! - StepComplete
//! - WorkflowComplete
//! - Error（サーバが送る失敗通知。状態遷移は起こさない）
//! - Ignored（未知の tag / 未知の step。エラーではない）

use serde_json::Value;

use super::ids::WorkflowId;
use super::state::{StepStatus, WorkflowStatus};
use super::step::StepName;

/// One decoded record: the run it belongs to plus the domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub workflow_id: Option<WorkflowId>,
    pub kind: DomainEvent,
}

impl StreamEvent {
    pub fn new(kind: DomainEvent) -> Self {
        Self {
            workflow_id: None,
            kind,
        }
    }

    pub fn for_workflow(workflow_id: WorkflowId, kind: DomainEvent) -> Self {
        Self {
            workflow_id: Some(workflow_id),
            kind,
        }
    }
}

/// Closed set of events the reducer understands.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    StepStart { step: StepName },

    StepComplete(StepCompletion),

    /// `status` is the server's verdict for the run, if it sent one.
    WorkflowComplete { status: Option<WorkflowStatus> },

    Error { message: String },

    Ignored(IgnoreReason),
}

impl DomainEvent {
    /// Wire tag, for logs.
    pub fn label(&self) -> &'static str {
        match self {
            DomainEvent::StepStart { .. } => "step_start",
            DomainEvent::StepComplete(_) => "step_complete",
            DomainEvent::WorkflowComplete { .. } => "workflow_complete",
            DomainEvent::Error { .. } => "error",
            DomainEvent::Ignored(_) => "ignored",
        }
    }

    pub fn step(&self) -> Option<StepName> {
        match self {
            DomainEvent::StepStart { step } => Some(*step),
            DomainEvent::StepComplete(completion) => Some(completion.step),
            _ => None,
        }
    }
}

/// A step_complete event.
///
/// `status` and `payload` are optional because the wire format does not
/// guarantee them; the reducer ignores a completion missing either.
#[derive(Debug, Clone, PartialEq)]
pub struct StepCompletion {
    pub step: StepName,
    pub status: Option<StepStatus>,
    pub payload: Option<CompletionPayload>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionPayload {
    /// Opaque step output.
    pub output: Value,
    /// Authoritative duration reported by the server.
    pub duration_ms: Option<f64>,
    pub warnings: Vec<String>,
}

/// Why a well-formed record carries nothing for the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownTag(String),
    UnknownStep(String),
    MissingStep,
}

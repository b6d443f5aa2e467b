//! Domain model (ids, steps, snapshot, events, history records, reducer, ...).
//!
//! I/O を持たない純粋なモジュールだけを置きます。
//! ストリームの復号は `codec`、タイマーや配信は `app` の責務です。

pub mod errors;
pub mod events;
pub mod history;
pub mod ids;
pub mod reducer;
pub mod request;
pub mod snapshot;
pub mod state;
pub mod step;

pub use errors::{ConfigError, FrameError, HistoryError, StreamFailure};
pub use events::{CompletionPayload, DomainEvent, IgnoreReason, StepCompletion, StreamEvent};
pub use history::{
    DEFAULT_PAGE_SIZE, HistoryQuery, LlmUsage, RunDetail, RunEvent, RunPage, RunRecord,
    RunSummary, StepResult, sort_newest_first,
};
pub use ids::{QueryId, SessionId, WorkflowId};
pub use reducer::{DurationSource, Reducer, TimerEffect, Transition, WorkflowReducer};
pub use request::{InvalidRequest, WorkflowRequest};
pub use snapshot::WorkflowSnapshot;
pub use state::{OverallStatus, StepStatus, WorkflowStatus};
pub use step::{StepMap, StepName, UnknownStep};

//! StreamRunner - 1 run 分のストリームを最後まで流す
//!
//! # フロー
//! 1. request を検証（不正なら snapshot に触れずに終了）
//! 2. snapshot を新しい session で作り直す（overall = running）
//! 3. EventSource::open
//! 4. chunk → FrameDecoder → EventParser → SnapshotStore::apply → タイマー効果
//! 5. 終了
//!    - 読み取り失敗: failed にしてタイマー全停止、エラーを返す（リトライしない）
//!    - 正常クローズ: EndOfStreamPolicy に従う
//!    - 置き換えられた: タイマーを止めて静かに抜ける
//!
//! 壊れたレコード（FrameError）はログに残してスキップし、ストリームは続けます。

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::store::SnapshotStore;
use super::timers::TimerRegistry;
use crate::codec::{EventParser, FrameDecoder};
use crate::domain::{
    FrameError, OverallStatus, Reducer, SessionId, StreamFailure, TimerEffect, WorkflowId,
    WorkflowReducer, WorkflowRequest, WorkflowSnapshot,
};
use crate::ports::EventSource;

/// `workflow_complete` なしでストリームが正常に閉じたときの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndOfStreamPolicy {
    /// 最後の status のまま（通常は `running`）
    #[default]
    LeaveUnchanged,
    /// 終端イベントの欠落を失敗とみなす
    MarkFailed,
}

/// run のストリームがどう終わったか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// run が終端 status に達したあとで閉じた
    Completed,
    /// 終端イベントなしで閉じた
    Closed,
    /// ストリームが終わる前に新しい run に置き換えられた
    Superseded,
}

#[derive(Debug)]
pub struct RunReport {
    pub session: SessionId,
    /// ストリームが運んできたサーバ側の run id
    pub workflow_id: Option<WorkflowId>,
    pub events_applied: usize,
    /// 復号できなかったレコード（到着順）
    pub frame_errors: Vec<FrameError>,
    pub end: StreamEnd,
}

pub struct StreamRunner {
    store: SnapshotStore,
    session: SessionId,
    timers: Arc<TimerRegistry>,
    reducer: Arc<dyn Reducer>,
    parser: EventParser,
    end_of_stream: EndOfStreamPolicy,
}

impl StreamRunner {
    /// session は registry のものを使う
    pub fn new(store: SnapshotStore, timers: Arc<TimerRegistry>) -> Self {
        Self {
            store,
            session: timers.session(),
            timers,
            reducer: Arc::new(WorkflowReducer::default()),
            parser: EventParser::new(),
            end_of_stream: EndOfStreamPolicy::default(),
        }
    }

    pub fn with_reducer(mut self, reducer: Arc<dyn Reducer>) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn with_end_of_stream(mut self, policy: EndOfStreamPolicy) -> Self {
        self.end_of_stream = policy;
        self
    }

    /// request を検証し、snapshot を自分の session で作り直してから流す
    pub async fn run(
        self,
        source: &dyn EventSource,
        request: &WorkflowRequest,
    ) -> Result<RunReport, StreamFailure> {
        request.validate()?;
        self.store.begin(self.session);
        self.drive(source, request).await
    }

    /// `run` から検証と `begin` を除いたもの
    ///
    /// 呼び出し側で `SnapshotStore::begin` 済みであること。
    /// begin のあと別の run に置き換えられていれば `Superseded` で抜けます。
    pub(crate) async fn drive(
        self,
        source: &dyn EventSource,
        request: &WorkflowRequest,
    ) -> Result<RunReport, StreamFailure> {
        let session = self.session;
        info!(%session, ticker = %request.ticker, "run started");

        let mut report = RunReport {
            session,
            workflow_id: None,
            events_applied: 0,
            frame_errors: Vec::new(),
            end: StreamEnd::Closed,
        };

        let mut chunks = match source.open(request).await {
            Ok(chunks) => chunks,
            Err(failure) => return Err(self.fail(failure)),
        };

        let mut decoder = FrameDecoder::new();
        let mut watcher = self.store.subscribe();

        loop {
            let next = tokio::select! {
                biased;
                _ = superseded(&mut watcher, session) => {
                    return Ok(self.superseded(report));
                }
                next = chunks.next() => next,
            };

            let bytes = match next {
                None => break,
                Some(Ok(bytes)) => bytes,
                Some(Err(failure)) => return Err(self.fail(failure)),
            };

            for record in decoder.feed(&bytes) {
                let event = match self.parser.parse(&record) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(%session, error = %e, "skipping malformed record");
                        report.frame_errors.push(e);
                        continue;
                    }
                };

                let Some(effects) = self.store.apply(session, self.reducer.as_ref(), &event) else {
                    return Ok(self.superseded(report));
                };
                report.events_applied += 1;
                debug!(%session, event = event.kind.label(), "event applied");
                self.carry_out(&effects);
            }
        }

        let dropped = decoder.finish();
        if dropped > 0 {
            debug!(%session, bytes = dropped, "discarding unterminated trailing record");
        }

        Ok(self.closed(report))
    }

    fn carry_out(&self, effects: &[TimerEffect]) {
        for effect in effects {
            match *effect {
                TimerEffect::Start(step) => self.timers.start(step),
                TimerEffect::Stop(step) => self.timers.stop(step),
                TimerEffect::StopAll => self.timers.stop_all(),
            }
        }
    }

    fn fail(&self, failure: StreamFailure) -> StreamFailure {
        error!(session = %self.session, error = %failure, "run failed");
        self.store.mark_failed(self.session);
        self.timers.stop_all();
        failure
    }

    fn superseded(&self, mut report: RunReport) -> RunReport {
        info!(session = %self.session, "run superseded");
        self.timers.stop_all();
        report.end = StreamEnd::Superseded;
        report
    }

    fn closed(&self, mut report: RunReport) -> RunReport {
        self.timers.stop_all();

        let snapshot: WorkflowSnapshot = self.store.current();
        if snapshot.session != Some(self.session) {
            return self.superseded(report);
        }
        report.workflow_id = snapshot.id.clone();

        if snapshot.overall_status == OverallStatus::Completed {
            report.end = StreamEnd::Completed;
            info!(session = %self.session, "run completed");
            return report;
        }

        report.end = StreamEnd::Closed;
        match self.end_of_stream {
            EndOfStreamPolicy::LeaveUnchanged => {
                warn!(
                    session = %self.session,
                    status = %snapshot.overall_status,
                    "stream closed without workflow_complete"
                );
            }
            EndOfStreamPolicy::MarkFailed => {
                if self.store.mark_failed(self.session) {
                    error!(session = %self.session, "stream closed without workflow_complete, run marked failed");
                }
            }
        }
        report
    }
}

/// store が別の session に移ったら完了する
async fn superseded(watcher: &mut watch::Receiver<WorkflowSnapshot>, session: SessionId) {
    if watcher
        .wait_for(|snapshot| snapshot.session != Some(session))
        .await
        .is_err()
    {
        // store が drop されることはないが、その場合は永久に待つ
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DurationSource, InvalidRequest, StepName, StepStatus};
    use crate::impls::ScriptedEventSource;
    use serde_json::json;
    use std::time::Duration;
    use ulid::Ulid;

    const START_RETRIEVAL: &str = r#"{"event":"step_start","step":"retrieval","workflow_id":"wf-1"}"#;
    const COMPLETE_RETRIEVAL: &str = r#"{"event":"step_complete","step":"retrieval","status":"completed","payload":{"output":{"answer":"x"},"duration_ms":4200}}"#;
    const WORKFLOW_COMPLETE: &str = r#"{"event":"workflow_complete","status":"completed"}"#;

    struct Harness {
        store: SnapshotStore,
        timers: Arc<TimerRegistry>,
    }

    impl Harness {
        fn new() -> Self {
            let store = SnapshotStore::new();
            let session = SessionId::from_ulid(Ulid::new());
            let timers = Arc::new(TimerRegistry::new(
                store.clone(),
                session,
                Duration::from_secs(1),
            ));
            Self { store, timers }
        }

        fn runner(&self) -> StreamRunner {
            StreamRunner::new(self.store.clone(), self.timers.clone())
        }
    }

    fn request() -> WorkflowRequest {
        WorkflowRequest::new("AAPL", "How is the outlook?")
    }

    #[tokio::test(start_paused = true)]
    async fn start_then_complete_uses_server_duration() {
        let h = Harness::new();
        let source = ScriptedEventSource::from_records([START_RETRIEVAL, COMPLETE_RETRIEVAL]);

        let report = h.runner().run(&source, &request()).await.unwrap();

        let snapshot = h.store.current();
        assert_eq!(snapshot.status_of(StepName::Retrieval), StepStatus::Completed);
        assert_eq!(snapshot.elapsed(StepName::Retrieval), 4);
        assert_eq!(
            snapshot.result(StepName::Retrieval),
            Some(&json!({"answer": "x"}))
        );
        assert_eq!(snapshot.id.as_ref().map(|id| id.as_str()), Some("wf-1"));
        assert!(!h.timers.is_active(StepName::Retrieval));

        assert_eq!(report.events_applied, 2);
        assert_eq!(report.workflow_id.as_ref().map(|id| id.as_str()), Some("wf-1"));
        assert_eq!(source.requests(), vec![request()]);
    }

    #[tokio::test(start_paused = true)]
    async fn running_step_has_an_active_timer() {
        let h = Harness::new();
        let source = ScriptedEventSource::from_records([START_RETRIEVAL]).then_hold_open();
        let runner = h.runner();

        let run = tokio::spawn(async move { runner.run(&source, &request()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            h.store.current().status_of(StepName::Retrieval),
            StepStatus::Running
        );
        assert!(h.timers.is_active(StepName::Retrieval));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(h.store.current().elapsed(StepName::Retrieval), 3);
        run.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_record_is_skipped_and_stream_continues() {
        let h = Harness::new();
        let source = ScriptedEventSource::new([
            format!("data: {START_RETRIEVAL}\n"),
            "data: {not json\n".to_string(),
            format!("data: {COMPLETE_RETRIEVAL}\n"),
        ]);

        let report = h.runner().run(&source, &request()).await.unwrap();

        assert_eq!(report.frame_errors.len(), 1);
        assert!(matches!(report.frame_errors[0], FrameError::Json { .. }));
        assert_eq!(report.events_applied, 2);
        assert_eq!(
            h.store.current().status_of(StepName::Retrieval),
            StepStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn records_split_across_chunks_are_reassembled() {
        let h = Harness::new();
        let text = format!("data: {START_RETRIEVAL}\n\ndata: {COMPLETE_RETRIEVAL}\n\ndata: {WORKFLOW_COMPLETE}\n\n");
        let bytes = text.into_bytes();
        let chunks: Vec<Vec<u8>> = bytes.chunks(7).map(<[u8]>::to_vec).collect();
        let source = ScriptedEventSource::new(chunks);

        let report = h.runner().run(&source, &request()).await.unwrap();

        assert_eq!(report.events_applied, 3);
        assert_eq!(report.end, StreamEnd::Completed);
        let snapshot = h.store.current();
        assert_eq!(snapshot.overall_status, OverallStatus::Completed);
        assert_eq!(snapshot.elapsed(StepName::Retrieval), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn abrupt_end_leaves_status_running_by_default() {
        let h = Harness::new();
        let source = ScriptedEventSource::from_records([START_RETRIEVAL]);

        let report = h.runner().run(&source, &request()).await.unwrap();

        assert_eq!(report.end, StreamEnd::Closed);
        let snapshot = h.store.current();
        assert_eq!(snapshot.overall_status, OverallStatus::Running);
        assert_eq!(snapshot.status_of(StepName::Retrieval), StepStatus::Running);
        assert!(h.timers.active_steps().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abrupt_end_can_be_treated_as_failure() {
        let h = Harness::new();
        let source = ScriptedEventSource::from_records([START_RETRIEVAL]);

        let report = h
            .runner()
            .with_end_of_stream(EndOfStreamPolicy::MarkFailed)
            .run(&source, &request())
            .await
            .unwrap();

        assert_eq!(report.end, StreamEnd::Closed);
        assert_eq!(h.store.current().overall_status, OverallStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_run_is_not_failed_by_end_policy() {
        let h = Harness::new();
        let source = ScriptedEventSource::from_records([START_RETRIEVAL, WORKFLOW_COMPLETE]);

        let report = h
            .runner()
            .with_end_of_stream(EndOfStreamPolicy::MarkFailed)
            .run(&source, &request())
            .await
            .unwrap();

        assert_eq!(report.end, StreamEnd::Completed);
        assert_eq!(h.store.current().overall_status, OverallStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn read_failure_fails_the_run_and_stops_timers() {
        let h = Harness::new();
        let source = ScriptedEventSource::from_records([START_RETRIEVAL])
            .then_fail(StreamFailure::Read("connection reset".into()));

        let err = h.runner().run(&source, &request()).await.unwrap_err();

        assert_eq!(err, StreamFailure::Read("connection reset".into()));
        assert_eq!(h.store.current().overall_status, OverallStatus::Failed);
        assert!(h.timers.active_steps().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn open_failure_fails_the_run() {
        let h = Harness::new();
        let source = ScriptedEventSource::default().fail_on_open(StreamFailure::Status {
            status: 503,
            body: "busy".into(),
        });

        let err = h.runner().run(&source, &request()).await.unwrap_err();

        assert!(matches!(err, StreamFailure::Status { status: 503, .. }));
        assert_eq!(h.store.current().overall_status, OverallStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_request_leaves_the_snapshot_alone() {
        let h = Harness::new();
        let source = ScriptedEventSource::from_records([START_RETRIEVAL]);

        let err = h
            .runner()
            .run(&source, &WorkflowRequest::new("  ", "q"))
            .await
            .unwrap_err();

        assert_eq!(err, StreamFailure::InvalidRequest(InvalidRequest::EmptyTicker));
        assert_eq!(h.store.current(), WorkflowSnapshot::idle());
        assert!(source.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_accumulate_between_events() {
        let h = Harness::new();
        // start は 2.5 秒後、complete は 5.0 秒後 → tick は 3.5 と 4.5 の 2 回
        let source = ScriptedEventSource::from_records([
            START_RETRIEVAL,
            r#"{"event":"step_complete","step":"retrieval","status":"completed","payload":{"output":null}}"#,
        ])
        .with_delay(Duration::from_millis(2500));

        h.runner().run(&source, &request()).await.unwrap();

        let snapshot = h.store.current();
        assert_eq!(snapshot.status_of(StepName::Retrieval), StepStatus::Completed);
        assert_eq!(snapshot.elapsed(StepName::Retrieval), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn client_ticks_can_win_over_server_duration() {
        let h = Harness::new();
        let source = ScriptedEventSource::from_records([START_RETRIEVAL, COMPLETE_RETRIEVAL])
            .with_delay(Duration::from_millis(2500));

        h.runner()
            .with_reducer(Arc::new(WorkflowReducer::new(DurationSource::ClientTicks)))
            .run(&source, &request())
            .await
            .unwrap();

        assert_eq!(h.store.current().elapsed(StepName::Retrieval), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_run_stops_quietly() {
        let h = Harness::new();
        let source = ScriptedEventSource::from_records([START_RETRIEVAL]).then_hold_open();
        let runner = h.runner();

        let run = tokio::spawn(async move { runner.run(&source, &request()).await });
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.store.current().elapsed(StepName::Retrieval), 1);

        let next = SessionId::from_ulid(Ulid::new());
        h.store.begin(next);

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.end, StreamEnd::Superseded);
        assert!(h.timers.active_steps().is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        let snapshot = h.store.current();
        assert_eq!(snapshot.session, Some(next));
        assert_eq!(snapshot.elapsed(StepName::Retrieval), 0);
    }
}

//! WorkflowMonitor - run を開始し、現在の snapshot を公開する入口
//!
//! 描画層からはこれだけ見えれば足ります。
//! - `subscribe()` / `snapshot()`: 現在の snapshot（読み取り専用）
//! - `run(request)`: 新しい run を開始し、ストリームが終わるまで待つ
//!
//! 新しい run を始めると、前の run のタイマーを止め、snapshot を新しい session で
//! 作り直します。前の run のストリームがまだ生きていても、その後のイベントは
//! session 不一致で捨てられ、前の runner は `StreamEnd::Superseded` で抜けます。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use super::config::ClientConfig;
use super::runner::{EndOfStreamPolicy, RunReport, StreamRunner};
use super::store::SnapshotStore;
use super::timers::TimerRegistry;
use crate::domain::{Reducer, StreamFailure, WorkflowReducer, WorkflowRequest, WorkflowSnapshot};
use crate::ports::{EventSource, IdGenerator, SystemClock, UlidGenerator};

pub struct WorkflowMonitor {
    source: Arc<dyn EventSource>,
    store: SnapshotStore,
    ids: Arc<dyn IdGenerator>,
    reducer: Arc<dyn Reducer>,
    tick: Duration,
    end_of_stream: EndOfStreamPolicy,
    /// 直近の run のタイマー（差し替えと begin はこのロックの中）
    active: Mutex<Option<Arc<TimerRegistry>>>,
}

impl WorkflowMonitor {
    pub fn new(source: Arc<dyn EventSource>, config: &ClientConfig) -> Self {
        Self {
            source,
            store: SnapshotStore::new(),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            reducer: Arc::new(WorkflowReducer::new(config.duration_source)),
            tick: config.tick,
            end_of_stream: config.end_of_stream,
            active: Mutex::new(None),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.store.current()
    }

    /// run を開始し、ストリームの終了・失敗・新しい run による置き換えまで流す
    ///
    /// registry の差し替えと `SnapshotStore::begin` は同じロックの中で行うので、
    /// 並行に呼ばれても最後に登録した run の session が snapshot に残ります。
    pub async fn run(&self, request: &WorkflowRequest) -> Result<RunReport, StreamFailure> {
        request.validate()?;

        let timers = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            let session = self.ids.generate_session_id();
            let timers = Arc::new(TimerRegistry::new(self.store.clone(), session, self.tick));
            if let Some(previous) = active.replace(timers.clone()) {
                debug!(previous = %previous.session(), %session, "stopping previous run's timers");
                previous.stop_all();
            }
            self.store.begin(session);
            timers
        };

        StreamRunner::new(self.store.clone(), timers)
            .with_reducer(self.reducer.clone())
            .with_end_of_stream(self.end_of_stream)
            .drive(self.source.as_ref(), request)
            .await
    }
}

//! TimerRegistry - ステップごとの経過秒カウンタ
//!
//! # 規則
//! - 1 ステップにつきタイマーは高々 1 つ（start は既存のものを止めてから張り直す）
//! - 1 tick ごとに `SnapshotStore::update` で +1（常に現在の snapshot に対して）
//! - tick が Stale（run が置き換えられた）または Unchanged（ステップが running で
//!   なくなった）を返したら、そのタイマーは自分で終わる
//! - stop / stop_all は未登録のキーでも何もしないだけ
//!
//! registry は 1 run（1 SessionId）専用です。drop すると全タイマーが止まります。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use super::store::{Applied, SnapshotStore};
use crate::domain::{SessionId, StepName};

pub struct TimerRegistry {
    store: SnapshotStore,
    session: SessionId,
    period: Duration,
    timers: Mutex<HashMap<StepName, JoinHandle<()>>>,
}

impl TimerRegistry {
    pub fn new(store: SnapshotStore, session: SessionId, period: Duration) -> Self {
        Self {
            store,
            session,
            period,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// `step` の tick を開始（または再開）する
    ///
    /// tokio ランタイムの中から呼ぶこと。
    pub fn start(&self, step: StepName) {
        let store = self.store.clone();
        let session = self.session;
        let period = self.period;
        // 遅れた tick は取りこぼさずまとめて数える（Burst）
        let mut interval = time::interval_at(Instant::now() + period, period);

        let handle = tokio::spawn(async move {
            loop {
                interval.tick().await;
                match store.update(session, |snapshot| snapshot.tick(step)) {
                    Applied::Changed => trace!(%session, %step, "tick"),
                    Applied::Unchanged => {
                        debug!(%session, %step, "step no longer running, timer ends");
                        break;
                    }
                    Applied::Stale => {
                        debug!(%session, %step, "run superseded, timer ends");
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.lock().insert(step, handle) {
            previous.abort();
            debug!(session = %self.session, %step, "timer restarted");
        } else {
            debug!(session = %self.session, %step, "timer started");
        }
    }

    pub fn stop(&self, step: StepName) {
        if let Some(handle) = self.lock().remove(&step) {
            handle.abort();
            debug!(session = %self.session, %step, "timer stopped");
        }
    }

    pub fn stop_all(&self) {
        let mut timers = self.lock();
        if timers.is_empty() {
            return;
        }
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        debug!(session = %self.session, "all timers stopped");
    }

    /// `step` に生きているタイマーがあるか
    pub fn is_active(&self, step: StepName) -> bool {
        self.lock()
            .get(&step)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 生きているタイマーを持つステップ（正規の順序）
    pub fn active_steps(&self) -> Vec<StepName> {
        let timers = self.lock();
        StepName::ALL
            .into_iter()
            .filter(|step| timers.get(step).is_some_and(|h| !h.is_finished()))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StepName, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

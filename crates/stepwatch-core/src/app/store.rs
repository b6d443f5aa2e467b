//! SnapshotStore - 現在の snapshot を持つ唯一の書き込み口
//!
//! `watch::Sender::send_if_modified` でロックを取り、その中で
//! 「現在の値」から次の値を計算します。キャプチャした古い値から
//! 次の状態を作ることはありません。
//!
//! 書き込みは必ず SessionId 付きです。snapshot の session と一致しない
//! 書き込み（置き換えられた run の遅れたイベントやタイマー）は捨てます。

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::{Reducer, SessionId, StreamEvent, TimerEffect, WorkflowSnapshot};

/// session 付き更新の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// snapshot が変わり、通知した
    Changed,
    /// 更新は走ったが snapshot は変わらなかった
    Unchanged,
    /// session が現在のものではない（何もしていない）
    Stale,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<WorkflowSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(WorkflowSnapshot::idle());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.tx.subscribe()
    }

    /// 現在の snapshot のコピー
    pub fn current(&self) -> WorkflowSnapshot {
        self.tx.borrow().clone()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.tx.borrow().session
    }

    /// `session` 用の新しい snapshot に置き換える
    ///
    /// 前の session の書き込みはすべて stale になります。
    pub fn begin(&self, session: SessionId) {
        self.tx.send_replace(WorkflowSnapshot::begin(session));
    }

    /// 現在の snapshot に対する直列化された read-modify-write
    ///
    /// `f` は変更したかどうかを返します。変更があったときだけ通知します。
    pub fn update(
        &self,
        session: SessionId,
        f: impl FnOnce(&mut WorkflowSnapshot) -> bool,
    ) -> Applied {
        let mut applied = Applied::Stale;
        self.tx.send_if_modified(|snapshot| {
            if snapshot.session != Some(session) {
                return false;
            }
            let changed = f(snapshot);
            applied = if changed {
                Applied::Changed
            } else {
                Applied::Unchanged
            };
            changed
        });
        applied
    }

    /// 現在の snapshot に 1 イベントを適用する
    ///
    /// 実行すべきタイマー効果を返します。`session` が置き換えられていれば `None`。
    pub fn apply(
        &self,
        session: SessionId,
        reducer: &dyn Reducer,
        event: &StreamEvent,
    ) -> Option<Vec<TimerEffect>> {
        let mut effects = None;
        self.update(session, |snapshot| {
            let transition = reducer.reduce(snapshot, event);
            let changed = transition.snapshot != *snapshot;
            *snapshot = transition.snapshot;
            effects = Some(transition.effects);
            changed
        });
        effects
    }

    /// `session` のストリーム失敗。status が変わったかどうかを返す
    pub fn mark_failed(&self, session: SessionId) -> bool {
        self.update(session, WorkflowSnapshot::mark_failed) == Applied::Changed
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

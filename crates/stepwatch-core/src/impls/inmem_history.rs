//! InMemoryHistory - 開発・テスト用の履歴ストア
//!
//! サーバの一覧の振る舞いを再現します。
//! - 完了済み（`completed_at` あり）の run だけが一覧に載る
//! - 新しい順。cursor は `"{completed_at}|{workflow_id}"`
//! - ticker は完全一致
//! - `next_cursor` はページが埋まったときだけ返す
//! - 見つからない cursor は先頭からの扱い
//! - 未知の id は 404 `Workflow run not found`

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::{
    HistoryError, HistoryQuery, RunEvent, RunPage, RunRecord, RunSummary, WorkflowId,
};
use crate::ports::HistoryApi;

const NOT_FOUND: &str = "Workflow run not found";

#[derive(Debug, Default)]
struct Store {
    records: HashMap<WorkflowId, RunRecord>,
    events: HashMap<WorkflowId, Vec<RunEvent>>,
}

#[derive(Debug, Default)]
pub struct InMemoryHistory {
    store: Mutex<Store>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// run とタイムラインを追加（既存なら置き換え）
    pub fn insert(&self, record: RunRecord, events: Vec<RunEvent>) {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.events.insert(record.workflow_id.clone(), events);
        store.records.insert(record.workflow_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cursor_for(record: &RunRecord) -> String {
    let completed_at = record
        .completed_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_default();
    format!("{completed_at}|{}", record.workflow_id)
}

fn not_found() -> HistoryError {
    HistoryError::Request {
        status: 404,
        body: NOT_FOUND.to_string(),
    }
}

#[async_trait]
impl HistoryApi for InMemoryHistory {
    async fn list_runs(&self, query: &HistoryQuery) -> Result<RunPage, HistoryError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);

        // 完了順インデックス（新しい順、同時刻は id 順）
        let mut index: Vec<&RunRecord> = store
            .records
            .values()
            .filter(|r| r.completed_at.is_some())
            .collect();
        index.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then_with(|| a.workflow_id.cmp(&b.workflow_id))
        });

        let start = query
            .cursor
            .as_deref()
            .and_then(|cursor| index.iter().position(|r| cursor_for(r) == cursor))
            .map_or(0, |idx| idx + 1);

        let limit = query.limit() as usize;
        let mut page = RunPage::default();
        for record in &index[start..] {
            if let Some(ticker) = &query.ticker
                && &record.ticker != ticker
            {
                continue;
            }
            page.runs.push(RunSummary {
                workflow_id: record.workflow_id.clone(),
                ticker: record.ticker.clone(),
                completed_at: record.completed_at,
                status: record.status,
            });
            if page.runs.len() >= limit {
                page.next_cursor = Some(cursor_for(record));
                break;
            }
        }
        Ok(page)
    }

    async fn get_run(&self, id: &WorkflowId) -> Result<RunRecord, HistoryError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.records.get(id).cloned().ok_or_else(not_found)
    }

    async fn get_events(&self, id: &WorkflowId) -> Result<Vec<RunEvent>, HistoryError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        if !store.records.contains_key(id) {
            return Err(not_found());
        }
        Ok(store.events.get(id).cloned().unwrap_or_default())
    }
}

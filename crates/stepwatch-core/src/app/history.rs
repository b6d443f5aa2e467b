//! HistoryClient - 過去 run の一覧・詳細の取得
//!
//! # 2 つの層
//! - そのまま叩く: `list_runs` / `get_run` / `get_events`（状態を持たない）
//! - 画面状態を持つ: `load_runs` / `load_more` / `select_run`
//!   結果は `HistoryState` として watch で公開します。
//!
//! # Supersession
//! 一覧（list）と詳細（detail）はそれぞれ「スロット」を持ち、リクエストごとに
//! 新しい QueryId を発行してスロットに記録します。レスポンス到着時に
//! スロットの QueryId が自分のものでなければ、そのレスポンスは成功でも
//! エラーでも捨てて `Fetched::Superseded` を返します。
//! 実際のリクエストは中断しません。
//!
//! 自動リトライはしません。

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join;
use tokio::sync::watch;
use tracing::{debug, info};

use super::config::ClientConfig;
use crate::domain::{
    HistoryError, HistoryQuery, QueryId, RunDetail, RunEvent, RunPage, RunRecord, RunSummary,
    WorkflowId, sort_newest_first,
};
use crate::ports::{HistoryApi, IdGenerator, SystemClock, UlidGenerator};

/// 後続のリクエストに追い越された可能性のある結果
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    /// スロットの最新リクエスト（state に反映済み）
    Current(T),
    /// 返る前に新しいリクエストが発行された（捨てた）
    Superseded,
}

impl<T> Fetched<T> {
    pub fn current(self) -> Option<T> {
        match self {
            Fetched::Current(value) => Some(value),
            Fetched::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Fetched::Superseded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed,
}

/// 履歴画面の公開状態
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryState {
    /// 現在の一覧のパラメータ
    pub query: HistoryQuery,
    /// `query` について読み込んだ全ページ（順序どおり）
    pub runs: Vec<RunSummary>,
    pub next_cursor: Option<String>,
    pub list: LoadState,
    pub list_error: Option<HistoryError>,

    pub selected: Option<WorkflowId>,
    pub record: Option<RunRecord>,
    /// 選択中の run のタイムライン（新しい順）
    pub events: Vec<RunEvent>,
    pub detail: LoadState,
    pub detail_error: Option<HistoryError>,

    list_token: Option<QueryId>,
    detail_token: Option<QueryId>,
}

impl HistoryState {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

enum Merge {
    Replace,
    Append,
}

pub struct HistoryClient {
    api: Arc<dyn HistoryApi>,
    ids: Arc<dyn IdGenerator>,
    page_size: u32,
    state: watch::Sender<HistoryState>,
}

impl HistoryClient {
    pub fn new(api: Arc<dyn HistoryApi>, config: &ClientConfig) -> Self {
        let page_size = config.page_size;
        let (state, _rx) = watch::channel(HistoryState {
            query: HistoryQuery::first_page(page_size),
            ..HistoryState::default()
        });
        Self {
            api,
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            page_size,
            state,
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<HistoryState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> HistoryState {
        self.state.borrow().clone()
    }

    // ========================================
    // 状態を持たないクエリ
    // ========================================

    pub async fn list_runs(&self, query: &HistoryQuery) -> Result<RunPage, HistoryError> {
        self.api.list_runs(query).await
    }

    pub async fn get_run(&self, id: &WorkflowId) -> Result<RunRecord, HistoryError> {
        self.api.get_run(id).await
    }

    /// ストアの順序のまま（表示順は `sort_newest_first`）
    pub async fn get_events(&self, id: &WorkflowId) -> Result<Vec<RunEvent>, HistoryError> {
        self.api.get_events(id).await
    }

    /// 一覧の全ページをたどる
    ///
    /// 同じ cursor が 2 度返ったらストアが進んでいないので `Decode` エラーにします。
    pub async fn collect_runs(&self, ticker: Option<String>) -> Result<Vec<RunSummary>, HistoryError> {
        let mut query = HistoryQuery::first_page(self.page_size).with_ticker(ticker);
        let mut seen = HashSet::new();
        let mut runs = Vec::new();

        loop {
            let page = self.api.list_runs(&query).await?;
            runs.extend(page.runs);
            let Some(cursor) = page.next_cursor else {
                return Ok(runs);
            };
            if !seen.insert(cursor.clone()) {
                return Err(HistoryError::Decode(format!("cursor repeated: {cursor}")));
            }
            query = query.next_page(cursor);
        }
    }

    // ========================================
    // 画面状態を持つクエリ
    // ========================================

    /// 新しい一覧を開始する（ticker で絞り込み可）
    ///
    /// 発行した時点で前のクエリの runs と cursor は消えます。`runs` は常に
    /// `query` の結果だけを持ちます。成功したら選択中の run も解除します。
    pub async fn load_runs(&self, ticker: Option<String>) -> Result<Fetched<RunPage>, HistoryError> {
        let token = self.ids.generate_query_id();
        let query = HistoryQuery::first_page(self.page_size).with_ticker(ticker);

        self.state.send_modify(|state| {
            state.list_token = Some(token);
            state.query = query.clone();
            state.runs.clear();
            state.next_cursor = None;
            state.list = LoadState::Loading;
            state.list_error = None;
        });
        debug!(%token, ticker = ?query.ticker, "loading runs");

        let result = self.api.list_runs(&query).await;
        self.finish_list(token, result, Merge::Replace)
    }

    /// 現在の一覧に次のページを追加する
    ///
    /// cursor がなければリクエストせず空ページを返します。
    /// 失敗しても runs と cursor はそのままなので、同じページを再試行できます。
    pub async fn load_more(&self) -> Result<Fetched<RunPage>, HistoryError> {
        let token = self.ids.generate_query_id();
        let mut next = None;
        self.state.send_if_modified(|state| {
            let Some(cursor) = state.next_cursor.clone() else {
                return false;
            };
            next = Some(state.query.next_page(cursor));
            state.list_token = Some(token);
            state.list = LoadState::Loading;
            state.list_error = None;
            true
        });

        let Some(query) = next else {
            return Ok(Fetched::Current(RunPage::default()));
        };
        debug!(%token, cursor = ?query.cursor, "loading more runs");

        let result = self.api.list_runs(&query).await;
        self.finish_list(token, result, Merge::Append)
    }

    /// run を選択し、record とタイムラインを同時に取得する
    pub async fn select_run(&self, id: WorkflowId) -> Result<Fetched<RunDetail>, HistoryError> {
        let token = self.ids.generate_query_id();
        self.state.send_modify(|state| {
            state.detail_token = Some(token);
            state.selected = Some(id.clone());
            state.record = None;
            state.events.clear();
            state.detail = LoadState::Loading;
            state.detail_error = None;
        });
        debug!(%token, workflow_id = %id, "loading run detail");

        let result = try_join(self.api.get_run(&id), self.api.get_events(&id)).await;

        let mut current = false;
        self.state.send_if_modified(|state| {
            if state.detail_token != Some(token) {
                return false;
            }
            current = true;
            match &result {
                Ok((record, events)) => {
                    let mut events = events.clone();
                    sort_newest_first(&mut events);
                    state.record = Some(record.clone());
                    state.events = events;
                    state.detail = LoadState::Loaded;
                }
                Err(e) => {
                    state.detail = LoadState::Failed;
                    state.detail_error = Some(e.clone());
                }
            }
            true
        });

        if !current {
            info!(%token, workflow_id = %id, "stale run detail dropped");
            return Ok(Fetched::Superseded);
        }
        let (record, events) = result?;
        Ok(Fetched::Current(RunDetail { record, events }))
    }

    /// 選択を解除する（実行中の詳細リクエストは stale になる）
    pub fn clear_selection(&self) {
        self.state.send_modify(|state| {
            state.detail_token = None;
            state.selected = None;
            state.record = None;
            state.events.clear();
            state.detail = LoadState::Idle;
            state.detail_error = None;
        });
    }

    fn finish_list(
        &self,
        token: QueryId,
        result: Result<RunPage, HistoryError>,
        merge: Merge,
    ) -> Result<Fetched<RunPage>, HistoryError> {
        let mut current = false;
        self.state.send_if_modified(|state| {
            if state.list_token != Some(token) {
                return false;
            }
            current = true;
            match &result {
                Ok(page) => {
                    match merge {
                        Merge::Replace => {
                            state.runs = page.runs.clone();
                            state.detail_token = None;
                            state.selected = None;
                            state.record = None;
                            state.events.clear();
                            state.detail = LoadState::Idle;
                            state.detail_error = None;
                        }
                        Merge::Append => state.runs.extend(page.runs.iter().cloned()),
                    }
                    state.next_cursor = page.next_cursor.clone();
                    state.list = LoadState::Loaded;
                }
                Err(e) => {
                    state.list = LoadState::Failed;
                    state.list_error = Some(e.clone());
                }
            }
            true
        });

        if !current {
            info!(%token, "stale run listing dropped");
            return Ok(Fetched::Superseded);
        }
        result.map(Fetched::Current)
    }
}

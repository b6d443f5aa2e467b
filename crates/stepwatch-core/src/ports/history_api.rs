//! HistoryApi port - 過去 run の参照
//!
//! 3 つの読み取り専用クエリだけを持ちます。キャッシュやリトライはしません。

use async_trait::async_trait;

use crate::domain::{HistoryError, HistoryQuery, RunEvent, RunPage, RunRecord, WorkflowId};

#[async_trait]
pub trait HistoryApi: Send + Sync {
    /// 新しい順に 1 ページ
    async fn list_runs(&self, query: &HistoryQuery) -> Result<RunPage, HistoryError>;

    /// 未知の id は status 404 で失敗する
    async fn get_run(&self, id: &WorkflowId) -> Result<RunRecord, HistoryError>;

    /// run のタイムライン（ストアの順序）
    async fn get_events(&self, id: &WorkflowId) -> Result<Vec<RunEvent>, HistoryError>;
}

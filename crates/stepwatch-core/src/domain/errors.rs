//! Errors - エラー型と分類
//!
//! # 分類
//! - `FrameError`: 1 レコードの復号失敗。ログに残してスキップ、ストリームは継続
//! - `StreamFailure`: 接続・読み取りの失敗。その run は終了（failed）
//! - `HistoryError`: 履歴 API の失敗。呼び出し元に返すだけで他の状態には影響しない
//! - `ConfigError`: 設定値の不正
//!
//! 古くなった履歴レスポンスはエラーではありません（`Fetched::Superseded`）。
//! どのエラーも自動リトライはしません。

use thiserror::Error;

use super::request::InvalidRequest;

/// レコードをイベントに復号できなかった
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed record ({excerpt}): {source}")]
    Json {
        excerpt: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("record is not a JSON object: {excerpt}")]
    NotAnObject { excerpt: String },

    #[error("record has no event tag: {excerpt}")]
    MissingTag { excerpt: String },
}

/// run のストリームの終端的な失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamFailure {
    #[error("invalid workflow request: {0}")]
    InvalidRequest(#[from] InvalidRequest),

    #[error("could not open stream: {0}")]
    Connect(String),

    #[error("stream request failed ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("server returned no readable body")]
    NoBody,

    #[error("stream read failed: {0}")]
    Read(String),
}

/// 履歴クエリの失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// 2xx 以外のレスポンス
    #[error("request failed ({status}): {body}")]
    Request { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl HistoryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            HistoryError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for {key} ({value:?}): {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// エラーメッセージ用のレコード先頭部分
pub(crate) fn excerpt(record: &str) -> String {
    const MAX: usize = 120;
    match record.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &record[..idx]),
        None => record.to_string(),
    }
}

//! EventSource port - 進捗ストリームの取得
//!
//! 開いたストリームはバイトチャンクの列です。レコード境界はチャンク境界と
//! 一致しないので、復号は `codec::FrameDecoder` に任せます。
//!
//! # 実装
//! - **HttpEventSource**: POST でストリームを開く（本番用）
//! - **ScriptedEventSource**: あらかじめ用意したチャンクを流す（テスト・デモ用）

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::domain::{StreamFailure, WorkflowRequest};

/// 開いたストリーム。読み取りエラーは `StreamFailure::Read` として流れてくる
pub type ChunkStream = BoxStream<'static, Result<Bytes, StreamFailure>>;

/// EventSource は 1 回の run につき 1 本のストリームを開く
#[async_trait]
pub trait EventSource: Send + Sync {
    /// ストリームを開く
    ///
    /// 接続エラー、non-2xx、ボディなしはここで `Err` になります。
    async fn open(&self, request: &WorkflowRequest) -> Result<ChunkStream, StreamFailure>;
}

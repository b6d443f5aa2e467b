//! ScriptedEventSource - 用意したチャンク列をそのまま流す EventSource
//!
//! # 用途
//! - テスト（チャンク境界、読み取り失敗、supersession）
//! - CLI のオフラインデモ（`--replay`）
//!
//! 受け取ったリクエストは記録しておき、後から検査できます。

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};

use crate::domain::{StreamFailure, WorkflowRequest};
use crate::ports::{ChunkStream, EventSource};

#[derive(Debug, Default)]
pub struct ScriptedEventSource {
    items: Vec<Result<Bytes, StreamFailure>>,
    delay: Option<Duration>,
    open_error: Option<StreamFailure>,
    /// 最後まで流したあと閉じずに待ち続ける
    hold_open: bool,
    requests: Mutex<Vec<WorkflowRequest>>,
}

impl ScriptedEventSource {
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            items: chunks.into_iter().map(|c| Ok(c.into())).collect(),
            ..Self::default()
        }
    }

    /// 1 レコード 1 チャンク（`data: {record}\n\n` で包む）
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(
            records
                .into_iter()
                .map(|record| format!("data: {record}\n\n")),
        )
    }

    /// 各チャンクの前に sleep する
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `open` がストリームを返さずに失敗する
    pub fn fail_on_open(mut self, failure: StreamFailure) -> Self {
        self.open_error = Some(failure);
        self
    }

    /// チャンクを流しきったあと読み取りが失敗する
    pub fn then_fail(mut self, failure: StreamFailure) -> Self {
        self.items.push(Err(failure));
        self
    }

    /// チャンクを流しきったあと、閉じずに待ち続ける
    pub fn then_hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// `open` が受け取ったリクエスト（古い順）
    pub fn requests(&self) -> Vec<WorkflowRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventSource for ScriptedEventSource {
    async fn open(&self, request: &WorkflowRequest) -> Result<ChunkStream, StreamFailure> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(failure) = &self.open_error {
            return Err(failure.clone());
        }

        let items = stream::iter(self.items.clone());
        let chunks: ChunkStream = match self.delay {
            Some(delay) => items
                .then(move |item| async move {
                    tokio::time::sleep(delay).await;
                    item
                })
                .boxed(),
            None => items.boxed(),
        };

        if self.hold_open {
            Ok(chunks.chain(stream::pending()).boxed())
        } else {
            Ok(chunks)
        }
    }
}

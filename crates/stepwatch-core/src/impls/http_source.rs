//! HttpEventSource - POST `{base}{prefix}/stream` で進捗ストリームを開く
//!
//! 接続にだけタイムアウトを掛けます。ストリーム全体の長さは制限しません。

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode, Url, header};
use tracing::{debug, warn};

use super::http::{endpoint, error_body};
use crate::app::config::ClientConfig;
use crate::domain::{StreamFailure, WorkflowRequest};
use crate::ports::{ChunkStream, EventSource};

pub struct HttpEventSource {
    client: Client,
    url: Url,
}

impl HttpEventSource {
    pub fn from_config(config: &ClientConfig) -> Result<Self, StreamFailure> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamFailure::Connect(e.to_string()))?;
        Self::with_client(client, config)
    }

    /// 呼び出し側で作った client を使う（コネクションプールの共有など）
    pub fn with_client(client: Client, config: &ClientConfig) -> Result<Self, StreamFailure> {
        let url = endpoint(&config.base_url, &config.route_prefix, &["stream"])
            .map_err(StreamFailure::Connect)?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn open(&self, request: &WorkflowRequest) -> Result<ChunkStream, StreamFailure> {
        debug!(url = %self.url, ticker = %request.ticker, "opening stream");

        let response = self
            .client
            .post(self.url.clone())
            .header(header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "stream request failed");
                StreamFailure::Connect(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            warn!(status = %status, error = %body, "stream request rejected");
            return Err(StreamFailure::Status {
                status: status.as_u16(),
                body,
            });
        }
        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Err(StreamFailure::NoBody);
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamFailure::Read(e.to_string())));
        Ok(chunks.boxed())
    }
}

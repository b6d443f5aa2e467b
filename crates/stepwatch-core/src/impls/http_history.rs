//! HttpHistoryApi - 履歴エンドポイントの reqwest 実装
//!
//! - `GET {prefix}/runs?limit&cursor&ticker`
//! - `GET {prefix}/runs/{id}`
//! - `GET {prefix}/runs/{id}/events`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::http::{endpoint, error_body};
use crate::app::config::ClientConfig;
use crate::domain::{HistoryError, HistoryQuery, RunEvent, RunPage, RunRecord, WorkflowId};
use crate::ports::HistoryApi;

/// `/runs/{id}/events` のレスポンス
#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<RunEvent>,
}

pub struct HttpHistoryApi {
    client: Client,
    base_url: String,
    route_prefix: String,
    timeout: Duration,
}

impl HttpHistoryApi {
    pub fn from_config(config: &ClientConfig) -> Result<Self, HistoryError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| HistoryError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            route_prefix: config.route_prefix.clone(),
            timeout: config.request_timeout,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, HistoryError> {
        endpoint(&self.base_url, &self.route_prefix, segments).map_err(HistoryError::Transport)
    }

    pub(crate) fn runs_url(&self, query: &HistoryQuery) -> Result<Url, HistoryError> {
        let mut url = self.url(&["runs"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit", &query.limit().to_string());
            if let Some(cursor) = &query.cursor {
                pairs.append_pair("cursor", cursor);
            }
            if let Some(ticker) = &query.ticker {
                pairs.append_pair("ticker", ticker);
            }
        }
        Ok(url)
    }

    pub(crate) fn run_url(&self, id: &WorkflowId) -> Result<Url, HistoryError> {
        self.url(&["runs", id.as_str()])
    }

    pub(crate) fn events_url(&self, id: &WorkflowId) -> Result<Url, HistoryError> {
        self.url(&["runs", id.as_str(), "events"])
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, HistoryError> {
        debug!(url = %url, "history request");

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "history request failed");
                HistoryError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            warn!(url = %url, status = %status, error = %body, "history request rejected");
            return Err(HistoryError::Request {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| HistoryError::Transport(e.to_string()))?;
        decode(&bytes)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, HistoryError> {
    serde_json::from_slice(bytes).map_err(|e| HistoryError::Decode(e.to_string()))
}

#[async_trait]
impl HistoryApi for HttpHistoryApi {
    async fn list_runs(&self, query: &HistoryQuery) -> Result<RunPage, HistoryError> {
        let url = self.runs_url(query)?;
        self.get_json(url).await
    }

    async fn get_run(&self, id: &WorkflowId) -> Result<RunRecord, HistoryError> {
        let url = self.run_url(id)?;
        self.get_json(url).await
    }

    async fn get_events(&self, id: &WorkflowId) -> Result<Vec<RunEvent>, HistoryError> {
        let url = self.events_url(id)?;
        let response: EventsResponse = self.get_json(url).await?;
        Ok(response.events)
    }
}

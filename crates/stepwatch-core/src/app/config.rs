//! ClientConfig - 環境変数からの設定読み込み
//!
//! | 変数 | 既定値 |
//! |---|---|
//! | `STEPWATCH_API_URL` | `http://localhost:8000` |
//! | `STEPWATCH_ROUTE_PREFIX` | `/v1/workflow` |
//! | `STEPWATCH_TICK_MS` | `1000` |
//! | `STEPWATCH_CONNECT_TIMEOUT_SECS` | `10` |
//! | `STEPWATCH_REQUEST_TIMEOUT_SECS` | `30` |
//! | `STEPWATCH_PAGE_SIZE` | `20` |
//! | `STEPWATCH_DURATION_SOURCE` | `server` (`server` \| `client`) |
//! | `STEPWATCH_ON_STREAM_END` | `leave` (`leave` \| `fail`) |
//!
//! `.env` の読み込みは CLI の責務です。ここではプロセス環境（またはテスト用の
//! lookup 関数）を読むだけです。

use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::app::runner::EndOfStreamPolicy;
use crate::domain::{ConfigError, DEFAULT_PAGE_SIZE, DurationSource};

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// API のオリジン（例: `http://localhost:8000`）。読み込み時に検証する
    pub base_url: String,
    /// workflow ルートのマウント先パス
    pub route_prefix: String,
    /// タイマーの tick 周期
    pub tick: Duration,
    pub connect_timeout: Duration,
    /// 履歴リクエストの全体タイムアウト（ストリームには無し）
    pub request_timeout: Duration,
    pub page_size: u32,
    pub duration_source: DurationSource,
    pub end_of_stream: EndOfStreamPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            route_prefix: "/v1/workflow".to_string(),
            tick: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
            duration_source: DurationSource::PreferServer,
            end_of_stream: EndOfStreamPolicy::LeaveUnchanged,
        }
    }
}

impl ClientConfig {
    /// プロセスの環境変数から読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `lookup` 経由で読み込む（未設定のキーはデフォルトのまま）
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("STEPWATCH_API_URL") {
            let url = Url::parse(value.trim()).map_err(|e| ConfigError {
                key: "STEPWATCH_API_URL",
                value: value.clone(),
                reason: e.to_string(),
            })?;
            if url.cannot_be_a_base() {
                return Err(ConfigError {
                    key: "STEPWATCH_API_URL",
                    value,
                    reason: "must be an http(s) origin".to_string(),
                });
            }
            config.base_url = url.as_str().trim_end_matches('/').to_string();
        }
        if let Some(value) = lookup("STEPWATCH_ROUTE_PREFIX") {
            config.route_prefix = value.trim().to_string();
        }
        if let Some(ms) = positive::<u64>(&lookup, "STEPWATCH_TICK_MS")? {
            config.tick = Duration::from_millis(ms);
        }
        if let Some(secs) = positive::<u64>(&lookup, "STEPWATCH_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = positive::<u64>(&lookup, "STEPWATCH_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = positive::<u32>(&lookup, "STEPWATCH_PAGE_SIZE")? {
            config.page_size = size;
        }
        if let Some(value) = lookup("STEPWATCH_DURATION_SOURCE") {
            config.duration_source = match value.trim() {
                "server" => DurationSource::PreferServer,
                "client" => DurationSource::ClientTicks,
                _ => {
                    return Err(ConfigError {
                        key: "STEPWATCH_DURATION_SOURCE",
                        value,
                        reason: "expected `server` or `client`".to_string(),
                    });
                }
            };
        }
        if let Some(value) = lookup("STEPWATCH_ON_STREAM_END") {
            config.end_of_stream = match value.trim() {
                "leave" => EndOfStreamPolicy::LeaveUnchanged,
                "fail" => EndOfStreamPolicy::MarkFailed,
                _ => {
                    return Err(ConfigError {
                        key: "STEPWATCH_ON_STREAM_END",
                        value,
                        reason: "expected `leave` or `fail`".to_string(),
                    });
                }
            };
        }

        Ok(config)
    }
}

/// キーが設定されていれば正の数として読む
fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    let parsed = value.trim().parse::<T>().map_err(|e| ConfigError {
        key,
        value: value.clone(),
        reason: e.to_string(),
    })?;
    if parsed == T::default() {
        return Err(ConfigError {
            key,
            value,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Some(parsed))
}

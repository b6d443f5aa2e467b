//! stepwatch-core
//!
//! Client-side engine for watching a streamed multi-step workflow run and
//! browsing the history of past runs.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, step, state, snapshot, events, history, request, reducer, errors）
//! - **codec**: ストリームの復号（FrameDecoder: バイト列→レコード、EventParser: レコード→イベント）
//! - **ports**: 抽象化レイヤー（EventSource, HistoryApi, Clock, IdGenerator）
//! - **impls**: 実装（reqwest による HTTP 実装、テスト・デモ用のスクリプト/インメモリ実装）
//! - **app**: アプリケーションロジック（store, timers, runner, monitor, history, config）

pub mod app;
pub mod codec;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{ClientConfig, HistoryClient, WorkflowMonitor};
pub use domain::{WorkflowRequest, WorkflowSnapshot};

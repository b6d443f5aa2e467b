//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **HttpEventSource** / **HttpHistoryApi**: reqwest による本番用実装
//! - **ScriptedEventSource**: チャンク列を再生する（テスト・デモ用）
//! - **InMemoryHistory**: サーバの一覧セマンティクスを再現する履歴ストア

mod http;
pub mod http_history;
pub mod http_source;
pub mod inmem_history;
pub mod scripted_source;

// 主要な型を再エクスポート
pub use self::http_history::HttpHistoryApi;
pub use self::http_source::HttpEventSource;
pub use self::inmem_history::InMemoryHistory;
pub use self::scripted_source::ScriptedEventSource;

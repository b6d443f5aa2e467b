//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 外部システム（ワークフロー API のストリームと履歴）と、時刻・ID の払い出しを
//! trait で隠蔽します。

pub mod clock;
pub mod event_source;
pub mod history_api;
pub mod id_generator;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_source::{ChunkStream, EventSource};
pub use self::history_api::HistoryApi;
pub use self::id_generator::{IdGenerator, UlidGenerator};

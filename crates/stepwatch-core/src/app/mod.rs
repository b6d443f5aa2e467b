//! App - アプリケーション層
//!
//! このモジュールは、ports と domain を組み合わせて実行時の振る舞いを実装します。
//!
//! # 主要コンポーネント
//! - **ClientConfig**: 環境変数からの設定
//! - **SnapshotStore**: 現在の snapshot を持つ唯一の書き込み口
//! - **TimerRegistry**: running ステップの経過秒カウンタ
//! - **StreamRunner**: 1 run 分のストリームを読み切るループ
//! - **WorkflowMonitor**: run の開始と置き換え
//! - **HistoryClient**: 過去 run の一覧・詳細（古いレスポンスは捨てる）

pub mod config;
pub mod history;
pub mod monitor;
pub mod runner;
pub mod store;
pub mod timers;

// 主要な型を再エクスポート
pub use self::config::ClientConfig;
pub use self::history::{Fetched, HistoryClient, HistoryState, LoadState};
pub use self::monitor::WorkflowMonitor;
pub use self::runner::{EndOfStreamPolicy, RunReport, StreamEnd, StreamRunner};
pub use self::store::{Applied, SnapshotStore};
pub use self::timers::TimerRegistry;

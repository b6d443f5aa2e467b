//! Codec - ストリームのバイト列からドメインイベントへ
//!
//! - `FrameDecoder`: チャンク -> 完結したレコード文字列
//! - `EventParser`: レコード文字列 -> `StreamEvent`
//!
//! どちらも I/O を持ちません。

pub mod frame;
pub mod parser;

pub use self::frame::{DATA_PREFIX, FrameDecoder};
pub use self::parser::EventParser;

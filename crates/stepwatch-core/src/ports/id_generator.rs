//! IdGenerator port - ID 生成の抽象化
//!
//! run ごとの SessionId と、履歴クエリごとの QueryId を払い出します。
//! どちらも「最新かどうか」の比較にだけ使うので、一意であれば十分です。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{QueryId, SessionId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は run / query の識別子を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（monitor と history client で共有する）
pub trait IdGenerator: Send + Sync {
    fn generate_session_id(&self) -> SessionId;

    fn generate_query_id(&self) -> QueryId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_session_id(&self) -> SessionId {
        SessionId::from(self.next_ulid())
    }

    fn generate_query_id(&self) -> QueryId {
        QueryId::from(self.next_ulid())
    }
}

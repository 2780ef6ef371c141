//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + 乱数で ULID を作る

use std::sync::Arc;

use crate::domain::ids::{InvocationId, LockToken, ReportId};
use crate::ports::Clock;
use ulid::Ulid;

/// # Thread Safety
/// - `Send + Sync` を要求（複数の呼び出しから共有される）
pub trait IdGenerator: Send + Sync {
    fn invocation_id(&self) -> InvocationId;

    fn lock_token(&self) -> LockToken;

    fn report_id(&self) -> ReportId;
}

/// UlidGenerator は Clock を使って時刻ベースの ULID を生成します。
/// FixedClock を渡せばタイムスタンプ部分が決定的になります。
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl IdGenerator for UlidGenerator {
    fn invocation_id(&self) -> InvocationId {
        InvocationId::from(self.next())
    }

    fn lock_token(&self) -> LockToken {
        LockToken::from(self.next())
    }

    fn report_id(&self) -> ReportId {
        ReportId::from(self.next())
    }
}

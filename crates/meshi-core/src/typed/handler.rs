//! Handler trait - kind ごとの作業単位
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)
//!
//! # 結果の扱い
//! handler は `Result<WorkOutcome, WorkError>` を返し、`DynHandler` が
//! `WorkOutcome` 1 つに畳む。payload の復元に失敗した task は handler を呼ばずに Fatal。

use async_trait::async_trait;
use std::marker::PhantomData;

use super::task::Task;
use crate::domain::outcome::{WorkError, WorkOutcome};
use crate::domain::task::{StoredTask, TaskKind};

/// Handler は検証済みの payload を受け取って 1 単位の作業をする
///
/// # 使用例
/// ```ignore
/// struct DetailHandler { /* 依存 */ }
///
/// #[async_trait]
/// impl Handler<ScrapingDetail> for DetailHandler {
///     async fn handle(&self, task: ScrapingDetail) -> Result<WorkOutcome, WorkError> {
///         // ...
///         Ok(WorkOutcome::done())
///     }
/// }
/// ```
///
/// 同じ task で何度呼ばれても壊れないこと（前回の副作用が一部残っていてもよい）。
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T) -> Result<WorkOutcome, WorkError>;
}

/// kind で引ける object-safe な handler
#[async_trait]
pub trait DynHandler: Send + Sync {
    fn kind(&self) -> TaskKind;

    async fn handle_stored(&self, stored: &StoredTask) -> WorkOutcome;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    fn kind(&self) -> TaskKind {
        T::KIND
    }

    async fn handle_stored(&self, stored: &StoredTask) -> WorkOutcome {
        let task = match T::from_stored(stored) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(kind = %T::KIND, key = %stored.key, error = %e, "task payload rejected");
                return WorkOutcome::Fatal(format!("invalid payload for {}: {e}", stored.key));
            }
        };
        match self.handler.handle(task).await {
            Ok(outcome) => outcome,
            Err(e) => e.into_outcome(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::payload::ScrapingDetail;
    use chrono::Utc;
    use serde_json::json;

    /// id が "J999" なら一時的な失敗、それ以外は成功
    pub(crate) struct FlakyDetailHandler;

    #[async_trait]
    impl Handler<ScrapingDetail> for FlakyDetailHandler {
        async fn handle(&self, task: ScrapingDetail) -> Result<WorkOutcome, WorkError> {
            if task.id == "J999" {
                return Err(WorkError::transient("listing site timed out"));
            }
            Ok(WorkOutcome::done())
        }
    }

    fn stored(key: &str, payload: serde_json::Value) -> StoredTask {
        StoredTask {
            kind: TaskKind::ScrapingDetail,
            key: key.to_string(),
            payload,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn typed_handler_decodes_and_runs() {
        let handler = TypedHandler::<ScrapingDetail, _>::new(FlakyDetailHandler);
        assert_eq!(handler.kind(), TaskKind::ScrapingDetail);

        let outcome = handler.handle_stored(&stored("J1", json!({ "id": "J1" }))).await;
        assert_eq!(outcome, WorkOutcome::done());
    }

    #[tokio::test]
    async fn handler_errors_become_outcomes() {
        let handler = TypedHandler::<ScrapingDetail, _>::new(FlakyDetailHandler);
        let outcome = handler
            .handle_stored(&stored("J999", json!({ "id": "J999" })))
            .await;
        assert!(matches!(outcome, WorkOutcome::RetryLater(_)));
    }

    #[tokio::test]
    async fn bad_payload_is_fatal_without_running_the_handler() {
        let handler = TypedHandler::<ScrapingDetail, _>::new(FlakyDetailHandler);
        let outcome = handler
            .handle_stored(&stored("J999", json!({ "id": "J999", "extra": true })))
            .await;
        assert!(matches!(outcome, WorkOutcome::Fatal(_)));
    }
}

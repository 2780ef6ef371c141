//! Outcome - 1 task 分の作業結果
//!
//! driver は例外の有無ではなく、この値を見て「削除して次へ進む」か
//! 「残して次回に任せる」かを決めます。
//!
//! - `Done`: 作業完了。successors を投入してから自分を削除する
//! - `RetryLater`: 一時的な失敗（通信断、ロック待ちタイムアウトなど）
//! - `Fatal`: 構造的な失敗（マークアップ変更、不正な payload など）。
//!   扱いは RetryLater と同じく「残す」だが、放っておいても直らない

use super::errors::{DbError, ExtractError, GeocodeError, StoreError, ValidationError};
use super::task::{NewTask, TaskKind};

#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    Done { successors: Vec<NewTask> },
    RetryLater(String),
    Fatal(String),
}

impl WorkOutcome {
    pub fn done() -> Self {
        WorkOutcome::Done {
            successors: Vec::new(),
        }
    }

    pub fn done_with(successors: Vec<NewTask>) -> Self {
        WorkOutcome::Done { successors }
    }

    /// successors に含まれる kind（重複なし、順序固定）
    pub fn successor_kinds(&self) -> Vec<TaskKind> {
        let WorkOutcome::Done { successors } = self else {
            return Vec::new();
        };
        let mut kinds: Vec<TaskKind> = successors.iter().map(|t| t.kind).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

/// handler が `?` で返すエラー
///
/// どの下位エラーがどちらに分類されるかは下の `From` 実装が決めます。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl WorkError {
    pub fn transient(msg: impl Into<String>) -> Self {
        WorkError::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        WorkError::Fatal(msg.into())
    }

    pub fn into_outcome(self) -> WorkOutcome {
        match self {
            WorkError::Transient(reason) => WorkOutcome::RetryLater(reason),
            WorkError::Fatal(reason) => WorkOutcome::Fatal(reason),
        }
    }
}

impl From<ExtractError> for WorkError {
    fn from(e: ExtractError) -> Self {
        match &e {
            ExtractError::Http { .. } => WorkError::Transient(e.to_string()),
            ExtractError::Status { status, .. } if *status >= 500 || *status == 429 => {
                WorkError::Transient(e.to_string())
            }
            _ => WorkError::Fatal(e.to_string()),
        }
    }
}

impl From<DbError> for WorkError {
    fn from(e: DbError) -> Self {
        match &e {
            DbError::Sql(_) | DbError::Column { .. } | DbError::Decode(_) => {
                WorkError::Fatal(e.to_string())
            }
            _ => WorkError::Transient(e.to_string()),
        }
    }
}

impl From<StoreError> for WorkError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Db(db) => db.into(),
            other => WorkError::Transient(other.to_string()),
        }
    }
}

impl From<GeocodeError> for WorkError {
    fn from(e: GeocodeError) -> Self {
        WorkError::Fatal(e.to_string())
    }
}

impl From<ValidationError> for WorkError {
    fn from(e: ValidationError) -> Self {
        WorkError::Fatal(e.to_string())
    }
}

impl From<serde_json::Error> for WorkError {
    fn from(e: serde_json::Error) -> Self {
        WorkError::Fatal(format!("payload encode: {e}"))
    }
}

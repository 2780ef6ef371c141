//! TaskStore port - 保留中の task の置き場
//!
//! 実装:
//! - **SqlTaskStore**: `update_tasks` テーブル（Database port 経由）
//! - **BlobTaskStore**: blob store 上のキー付き JSON（1 task = 1 object）
//! - **InMemoryTaskStore**: テスト・ローカル実行用
//!
//! # 設計原則
//! - `enqueue` は insert-if-absent。同じ `(kind, key)` の再投入は成功扱いで何も変えない
//! - `fetch_one` は削除しない（peek）。削除は作業完了後に driver が `delete` で行う
//! - `(kind, key)` ごとに独立しているので、追加のロックは要らない

use async_trait::async_trait;

use crate::domain::errors::StoreError;
use crate::domain::task::{NewTask, StoredTask, TaskKind};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// まだ無いものだけを投入する。戻り値は新規に入った件数（実装が分かる範囲で）
    async fn enqueue(&self, tasks: &[NewTask]) -> Result<usize, StoreError>;

    /// `kind` の中で最も古い task を 1 件返す（削除はしない）
    async fn fetch_one(&self, kind: TaskKind) -> Result<Option<StoredTask>, StoreError>;

    /// 完了した task を消す。存在しなくてもエラーにしない
    async fn delete(&self, kind: TaskKind, key: &str) -> Result<(), StoreError>;

    /// `kind` の保留中 task をすべて fetch 順で返す
    async fn pending(&self, kind: TaskKind) -> Result<Vec<StoredTask>, StoreError>;
}

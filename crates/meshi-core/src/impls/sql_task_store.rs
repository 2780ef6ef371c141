//! SqlTaskStore - `update_tasks` テーブル上の task store
//!
//! # 実装
//! - enqueue: insert-if-absent を `CHUNK` 行ずつの複数行 INSERT にし、1 回の `write()` で送る
//!   （単一ファイル DB ではロック取得 1 回・1 トランザクション）
//! - fetch: `created_at ASC, param ASC` の先頭 1 件
//! - created_at は epoch ミリ秒。同じ呼び出しで入れた task は 1ms ずつずらして投入順を保つ

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::StoreError;
use crate::domain::task::{NewTask, StoredTask, TaskKind};
use crate::ports::database::{Database, Row, SqlValue, Statement, placeholders};
use crate::ports::{Clock, TaskStore};

/// 1 文あたりの行数（SQLite の変数上限 32766 / 4 列に十分収まる）
const CHUNK: usize = 200;

pub struct SqlTaskStore {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
}

impl SqlTaskStore {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    fn insert_statements(&self, tasks: &[NewTask]) -> Result<Vec<Statement>, StoreError> {
        let base = self.clock.now().timestamp_millis();
        let verb = self.db.dialect().insert_ignore();
        let mut statements = Vec::new();
        for (chunk_index, chunk) in tasks.chunks(CHUNK).enumerate() {
            let mut params = Vec::with_capacity(chunk.len() * 4);
            for (i, task) in chunk.iter().enumerate() {
                let offset = (chunk_index * CHUNK + i) as i64;
                params.push(SqlValue::from(task.kind.as_str()));
                params.push(SqlValue::from(&task.key));
                params.push(SqlValue::from(serde_json::to_string(&task.payload)?));
                params.push(SqlValue::Integer(base + offset));
            }
            let sql = format!(
                "{verb} INTO update_tasks (kind, param, payload, created_at) VALUES {}",
                placeholders(4, chunk.len())
            );
            statements.push(Statement::new(sql, params));
        }
        Ok(statements)
    }
}

fn decode(row: &Row) -> Result<StoredTask, StoreError> {
    let kind: TaskKind = row
        .text("kind")?
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("{e}")))?;
    let key = row.text("param")?;
    let payload = serde_json::from_str(&row.text("payload")?)?;
    let millis = row.i64("created_at")?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("created_at {millis} out of range")))?;
    Ok(StoredTask {
        kind,
        key,
        payload,
        created_at,
    })
}

const SELECT_COLUMNS: &str = "SELECT kind, param, payload, created_at FROM update_tasks";

#[async_trait]
impl TaskStore for SqlTaskStore {
    async fn enqueue(&self, tasks: &[NewTask]) -> Result<usize, StoreError> {
        if tasks.is_empty() {
            return Ok(0);
        }
        let statements = self.insert_statements(tasks)?;
        let inserted = self.db.write(statements).await?;
        tracing::debug!(requested = tasks.len(), inserted, "tasks enqueued");
        Ok(inserted as usize)
    }

    async fn fetch_one(&self, kind: TaskKind) -> Result<Option<StoredTask>, StoreError> {
        let sql =
            format!("{SELECT_COLUMNS} WHERE kind = ? ORDER BY created_at ASC, param ASC LIMIT 1");
        let rows = self.db.read(&sql, &[kind.as_str().into()]).await?;
        rows.first().map(decode).transpose()
    }

    async fn delete(&self, kind: TaskKind, key: &str) -> Result<(), StoreError> {
        self.db
            .write_one(
                "DELETE FROM update_tasks WHERE kind = ? AND param = ?",
                vec![kind.as_str().into(), key.into()],
            )
            .await?;
        Ok(())
    }

    async fn pending(&self, kind: TaskKind) -> Result<Vec<StoredTask>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE kind = ? ORDER BY created_at ASC, param ASC");
        let rows = self.db.read(&sql, &[kind.as_str().into()]).await?;
        rows.iter().map(decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::single_file_db::schema_database;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use serde_json::json;

    fn detail(id: &str) -> NewTask {
        NewTask {
            kind: TaskKind::ScrapingDetail,
            key: id.to_string(),
            payload: json!({ "id": id }),
        }
    }

    async fn store() -> (SqlTaskStore, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        ));
        let db = Arc::new(schema_database().await);
        (SqlTaskStore::new(db, clock.clone()), clock)
    }

    #[tokio::test]
    async fn enqueue_twice_keeps_one_row() {
        let (store, _) = store().await;
        assert_eq!(store.enqueue(&[detail("J1"), detail("J2")]).await.unwrap(), 2);
        assert_eq!(store.enqueue(&[detail("J1")]).await.unwrap(), 0);
        assert_eq!(store.pending(TaskKind::ScrapingDetail).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fetch_follows_enqueue_order_then_delete_retires() {
        let (store, clock) = store().await;
        store.enqueue(&[detail("J30"), detail("J4")]).await.unwrap();
        clock.advance(chrono::Duration::seconds(5));
        store.enqueue(&[detail("J1")]).await.unwrap();

        let keys: Vec<String> = store
            .pending(TaskKind::ScrapingDetail)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.key)
            .collect();
        assert_eq!(keys, ["J30", "J4", "J1"]);

        let first = store.fetch_one(TaskKind::ScrapingDetail).await.unwrap().unwrap();
        assert_eq!(first.key, "J30");
        assert_eq!(first.payload, json!({ "id": "J30" }));
        assert_eq!(first.created_at, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());

        store.delete(TaskKind::ScrapingDetail, "J30").await.unwrap();
        let next = store.fetch_one(TaskKind::ScrapingDetail).await.unwrap().unwrap();
        assert_eq!(next.key, "J4");
        assert!(store.fetch_one(TaskKind::RegisterPages).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn large_batches_are_chunked_into_one_write() {
        let (store, _) = store().await;
        let tasks: Vec<NewTask> = (0..450).map(|i| detail(&format!("J{i}"))).collect();
        assert_eq!(store.insert_statements(&tasks).unwrap().len(), 3);
        assert_eq!(store.enqueue(&tasks).await.unwrap(), 450);
    }
}

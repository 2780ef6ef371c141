//! BlobTaskStore - blob store 上のキー付き task
//!
//! 1 task = 1 object（`{prefix}/{kind}/{key}.json`）。
//! `(kind, key)` ごとに別 object なのでロックは取らず、
//! store の条件付き作成（create-if-absent）だけで重複投入を防ぐ。

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutPayload};

use crate::domain::errors::StoreError;
use crate::domain::task::{NewTask, StoredTask, TaskKind};
use crate::impls::blob::child_path;
use crate::ports::{Clock, TaskStore};

pub struct BlobTaskStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl BlobTaskStore {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            clock,
        }
    }

    fn task_path(&self, kind: TaskKind, key: &str) -> Path {
        child_path(&self.prefix, &[kind.as_str(), &format!("{key}.json")])
    }

    fn kind_prefix(&self, kind: TaskKind) -> Path {
        child_path(&self.prefix, &[kind.as_str()])
    }

    /// 作れたら true、既にあれば false
    async fn create_if_absent(&self, path: &Path, body: Vec<u8>) -> Result<bool, StoreError> {
        match self
            .store
            .put_opts(path, PutPayload::from(body.clone()), PutMode::Create.into())
            .await
        {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. })
            | Err(object_store::Error::Precondition { .. }) => Ok(false),
            Err(object_store::Error::NotImplemented) => {
                match self.store.head(path).await {
                    Ok(_) => Ok(false),
                    Err(object_store::Error::NotFound { .. }) => {
                        self.store
                            .put(path, PutPayload::from(body))
                            .await
                            .map_err(blob_error)?;
                        Ok(true)
                    }
                    Err(e) => Err(blob_error(e)),
                }
            }
            Err(e) => Err(blob_error(e)),
        }
    }

    async fn load(&self, path: &Path) -> Result<Option<StoredTask>, StoreError> {
        match self.store.get(path).await {
            Ok(result) => {
                let bytes = result.bytes().await.map_err(blob_error)?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            // list と get の間に他の invocation が消した
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(blob_error(e)),
        }
    }
}

fn blob_error(e: object_store::Error) -> StoreError {
    StoreError::Blob(Box::new(e))
}

#[async_trait]
impl TaskStore for BlobTaskStore {
    async fn enqueue(&self, tasks: &[NewTask]) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut inserted = 0;
        for (i, task) in tasks.iter().enumerate() {
            let stored = StoredTask::from_new(
                task.clone(),
                now + chrono::Duration::milliseconds(i as i64),
            );
            let body = serde_json::to_vec(&stored)?;
            if self
                .create_if_absent(&self.task_path(task.kind, &task.key), body)
                .await?
            {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn fetch_one(&self, kind: TaskKind) -> Result<Option<StoredTask>, StoreError> {
        Ok(self.pending(kind).await?.into_iter().next())
    }

    async fn delete(&self, kind: TaskKind, key: &str) -> Result<(), StoreError> {
        match self.store.delete(&self.task_path(kind, key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(blob_error(e)),
        }
    }

    async fn pending(&self, kind: TaskKind) -> Result<Vec<StoredTask>, StoreError> {
        let prefix = self.kind_prefix(kind);
        let metas: Vec<_> = self
            .store
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(blob_error)?;

        let mut tasks = Vec::with_capacity(metas.len());
        for meta in metas {
            if let Some(task) = self.load(&meta.location).await? {
                if task.kind != kind {
                    return Err(StoreError::Corrupt(format!(
                        "{} holds a {} task",
                        meta.location, task.kind
                    )));
                }
                tasks.push(task);
            }
        }
        tasks.sort_by(|a, b| a.fetch_order(b));
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use object_store::memory::InMemory;
    use serde_json::json;

    fn abstract_task(key: &str) -> NewTask {
        NewTask {
            kind: TaskKind::ScrapingAbstract,
            key: key.to_string(),
            payload: json!({ "page": 1 }),
        }
    }

    fn store() -> (BlobTaskStore, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        ));
        (
            BlobTaskStore::new(Arc::new(InMemory::new()), "tasks", clock.clone()),
            clock,
        )
    }

    #[tokio::test]
    async fn duplicate_keys_are_ignored() {
        let (store, _) = store();
        assert_eq!(store.enqueue(&[abstract_task("X005_1")]).await.unwrap(), 1);
        assert_eq!(
            store
                .enqueue(&[abstract_task("X005_1"), abstract_task("X005_2")])
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.pending(TaskKind::ScrapingAbstract).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn oldest_task_is_fetched_and_kinds_are_separate() {
        let (store, clock) = store();
        store.enqueue(&[abstract_task("X005_2")]).await.unwrap();
        clock.advance(chrono::Duration::minutes(1));
        store.enqueue(&[abstract_task("X005_1")]).await.unwrap();

        let first = store.fetch_one(TaskKind::ScrapingAbstract).await.unwrap().unwrap();
        assert_eq!(first.key, "X005_2");
        assert!(store.fetch_one(TaskKind::ScrapingDetail).await.unwrap().is_none());

        store.delete(TaskKind::ScrapingAbstract, "X005_2").await.unwrap();
        store.delete(TaskKind::ScrapingAbstract, "X005_2").await.unwrap();
        let next = store.fetch_one(TaskKind::ScrapingAbstract).await.unwrap().unwrap();
        assert_eq!(next.key, "X005_1");
    }
}

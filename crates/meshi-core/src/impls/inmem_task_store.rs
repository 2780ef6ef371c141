//! In-memory task store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::errors::StoreError;
use crate::domain::task::{NewTask, StoredTask, TaskKind};
use crate::ports::{Clock, TaskStore};

pub struct InMemoryTaskStore {
    clock: Arc<dyn Clock>,
    /// (kind, key) -> task
    tasks: Mutex<BTreeMap<(TaskKind, String), StoredTask>>,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tasks: Mutex::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn enqueue(&self, tasks: &[NewTask]) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut map = self.tasks.lock().await;
        let mut inserted = 0;
        for (i, task) in tasks.iter().enumerate() {
            let slot = (task.kind, task.key.clone());
            if map.contains_key(&slot) {
                continue;
            }
            // 同じ呼び出しで入れたものは投入順に取り出せるよう 1ms ずつずらす
            let created_at = now + chrono::Duration::milliseconds(i as i64);
            map.insert(slot, StoredTask::from_new(task.clone(), created_at));
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn fetch_one(&self, kind: TaskKind) -> Result<Option<StoredTask>, StoreError> {
        let map = self.tasks.lock().await;
        Ok(map
            .values()
            .filter(|t| t.kind == kind)
            .min_by(|a, b| a.fetch_order(b))
            .cloned())
    }

    async fn delete(&self, kind: TaskKind, key: &str) -> Result<(), StoreError> {
        self.tasks.lock().await.remove(&(kind, key.to_string()));
        Ok(())
    }

    async fn pending(&self, kind: TaskKind) -> Result<Vec<StoredTask>, StoreError> {
        let map = self.tasks.lock().await;
        let mut tasks: Vec<StoredTask> = map.values().filter(|t| t.kind == kind).cloned().collect();
        tasks.sort_by(|a, b| a.fetch_order(b));
        Ok(tasks)
    }
}

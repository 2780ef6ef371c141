//! BlobScheduleBackend - スケジュールを blob store の JSON として持つ
//!
//! `{prefix}/{group}/{name}.json` に 1 件ずつ。作成は条件付き作成なので
//! 同名の同時登録は片方が `Conflict` になる。

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutPayload};

use crate::domain::errors::SchedulerError;
use crate::impls::blob::child_path;
use crate::ports::{Schedule, ScheduleBackend};

pub struct BlobScheduleBackend {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl BlobScheduleBackend {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn path(&self, group: &str, name: &str) -> Path {
        child_path(&self.prefix, &[group, &format!("{name}.json")])
    }

    async fn load(&self, path: &Path) -> Result<Option<Schedule>, SchedulerError> {
        match self.store.get(path).await {
            Ok(result) => {
                let bytes = result.bytes().await.map_err(backend)?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(backend(e)),
        }
    }
}

fn backend(e: object_store::Error) -> SchedulerError {
    SchedulerError::Backend(Box::new(e))
}

fn conflict(schedule: &Schedule) -> SchedulerError {
    SchedulerError::Conflict {
        group: schedule.group.clone(),
        name: schedule.name.clone(),
    }
}

#[async_trait]
impl ScheduleBackend for BlobScheduleBackend {
    async fn get(&self, group: &str, name: &str) -> Result<Option<Schedule>, SchedulerError> {
        self.load(&self.path(group, name)).await
    }

    async fn create(&self, schedule: &Schedule) -> Result<(), SchedulerError> {
        let path = self.path(&schedule.group, &schedule.name);
        let body = serde_json::to_vec(schedule)?;
        match self
            .store
            .put_opts(&path, PutPayload::from(body.clone()), PutMode::Create.into())
            .await
        {
            Ok(_) => Ok(()),
            Err(object_store::Error::AlreadyExists { .. })
            | Err(object_store::Error::Precondition { .. }) => Err(conflict(schedule)),
            Err(object_store::Error::NotImplemented) => {
                if self.load(&path).await?.is_some() {
                    return Err(conflict(schedule));
                }
                self.store
                    .put(&path, PutPayload::from(body))
                    .await
                    .map_err(backend)?;
                Ok(())
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn delete(&self, group: &str, name: &str) -> Result<(), SchedulerError> {
        let path = self.path(group, name);
        // object store の delete は存在しなくても成功することがあるので先に確認する
        match self.store.head(&path).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => {
                return Err(SchedulerError::NotFound {
                    group: group.to_string(),
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(backend(e)),
        }
        self.store.delete(&path).await.map_err(backend)
    }

    async fn list(&self, group: &str) -> Result<Vec<Schedule>, SchedulerError> {
        let prefix = child_path(&self.prefix, &[group]);
        let metas: Vec<_> = self
            .store
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(backend)?;
        let mut schedules = Vec::with_capacity(metas.len());
        for meta in metas {
            if let Some(schedule) = self.load(&meta.location).await? {
                schedules.push(schedule);
            }
        }
        schedules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(schedules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Trigger;
    use chrono::{TimeZone, Utc};
    use object_store::memory::InMemory;

    fn schedule(name: &str, trigger: Trigger) -> Schedule {
        Schedule {
            name: name.to_string(),
            group: "meshi".to_string(),
            target: "ScrapingAbstract".to_string(),
            identity: "meshi-runner".to_string(),
            trigger,
            created_at: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn schedules_roundtrip_through_the_store() {
        let backend = BlobScheduleBackend::new(Arc::new(InMemory::new()), "schedules");
        let at = Utc.with_ymd_and_hms(2024, 4, 1, 15, 11, 0).unwrap();
        let one_shot = schedule("ScrapingAbstract_X005_1", Trigger::At(at));

        backend.create(&one_shot).await.unwrap();
        backend
            .create(&schedule("ScrapingAbstract", Trigger::EveryMinute))
            .await
            .unwrap();

        assert_eq!(
            backend.get("meshi", "ScrapingAbstract_X005_1").await.unwrap(),
            Some(one_shot.clone())
        );
        assert!(matches!(
            backend.create(&one_shot).await,
            Err(SchedulerError::Conflict { .. })
        ));

        let names: Vec<String> = backend
            .list("meshi")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["ScrapingAbstract", "ScrapingAbstract_X005_1"]);
    }

    #[tokio::test]
    async fn deleting_a_missing_schedule_is_not_found() {
        let backend = BlobScheduleBackend::new(Arc::new(InMemory::new()), "schedules");
        assert!(matches!(
            backend.delete("meshi", "ScrapingDetail").await,
            Err(SchedulerError::NotFound { .. })
        ));
    }
}

//! In-memory schedule backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::errors::SchedulerError;
use crate::ports::{Schedule, ScheduleBackend};

#[derive(Default)]
pub struct InMemoryScheduleBackend {
    /// (group, name) -> schedule
    schedules: Mutex<BTreeMap<(String, String), Schedule>>,
}

impl InMemoryScheduleBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleBackend for InMemoryScheduleBackend {
    async fn get(&self, group: &str, name: &str) -> Result<Option<Schedule>, SchedulerError> {
        let map = self.schedules.lock().await;
        Ok(map.get(&(group.to_string(), name.to_string())).cloned())
    }

    async fn create(&self, schedule: &Schedule) -> Result<(), SchedulerError> {
        let mut map = self.schedules.lock().await;
        let slot = (schedule.group.clone(), schedule.name.clone());
        if map.contains_key(&slot) {
            return Err(SchedulerError::Conflict {
                group: slot.0,
                name: slot.1,
            });
        }
        map.insert(slot, schedule.clone());
        Ok(())
    }

    async fn delete(&self, group: &str, name: &str) -> Result<(), SchedulerError> {
        let mut map = self.schedules.lock().await;
        match map.remove(&(group.to_string(), name.to_string())) {
            Some(_) => Ok(()),
            None => Err(SchedulerError::NotFound {
                group: group.to_string(),
                name: name.to_string(),
            }),
        }
    }

    async fn list(&self, group: &str) -> Result<Vec<Schedule>, SchedulerError> {
        let map = self.schedules.lock().await;
        Ok(map
            .values()
            .filter(|s| s.group == group)
            .cloned()
            .collect())
    }
}

//! AppBuilder - handler の登録と driver の組み立て
//!
//! # 学習ポイント
//! - Builder パターン
//! - 起動時検証（Fail-fast）: 期待した kind が揃っていなければ `build()` で落とす

use std::sync::Arc;

use super::driver::LifecycleDriver;
use super::schedules::ScheduleAdapter;
use crate::domain::task::TaskKind;
use crate::ports::{ErrorSink, TaskStore};
use crate::typed::{Handler, RegistryError, Task, TypedRegistry};

/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .register::<ScrapingDetail, _>(ScrapingDetailHandler::new(site, geocoder, db))?
///     .expect_kinds(&[TaskKind::ScrapingDetail])
///     .build(services)?;
/// let driver = app.driver(TaskKind::ScrapingDetail)?;
/// ```
#[derive(Default)]
pub struct AppBuilder {
    registry: TypedRegistry,
    expected: Option<Vec<TaskKind>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing handlers for task kinds: {0:?}")]
    MissingTaskKinds(Vec<TaskKind>),

    #[error("no handler registered for task kind `{0}`")]
    NotRegistered(TaskKind),
}

/// driver が共有する依存
#[derive(Clone)]
pub struct DriverServices {
    pub tasks: Arc<dyn TaskStore>,
    pub schedules: Arc<ScheduleAdapter>,
    pub sink: Arc<dyn ErrorSink>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(mut self, handler: H) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    pub fn expect_kinds(mut self, kinds: &[TaskKind]) -> Self {
        self.expected = Some(kinds.to_vec());
        self
    }

    pub fn build(self, services: DriverServices) -> Result<App, BuildError> {
        if let Some(expected) = &self.expected {
            let registered = self.registry.registered_kinds();
            let missing: Vec<TaskKind> = expected
                .iter()
                .filter(|k| !registered.contains(k))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTaskKinds(missing));
            }
        }
        Ok(App {
            registry: self.registry,
            services,
        })
    }
}

pub struct App {
    registry: TypedRegistry,
    services: DriverServices,
}

impl App {
    pub fn kinds(&self) -> Vec<TaskKind> {
        self.registry.registered_kinds()
    }

    pub fn services(&self) -> &DriverServices {
        &self.services
    }

    pub fn driver(&self, kind: TaskKind) -> Result<LifecycleDriver, BuildError> {
        let handler = self.registry.get(kind).ok_or(BuildError::NotRegistered(kind))?;
        Ok(LifecycleDriver::new(
            handler,
            Arc::clone(&self.services.tasks),
            Arc::clone(&self.services.schedules),
            Arc::clone(&self.services.sink),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::schedules::ScheduleSettings;
    use crate::config::SchedulerConfig;
    use crate::domain::payload::ScrapingDetail;
    use crate::impls::error_sink::RecordingSink;
    use crate::impls::notifier::RecordingNotifier;
    use crate::impls::{InMemoryScheduleBackend, InMemoryTaskStore};
    use crate::ports::SystemClock;
    use crate::typed::handler::tests::FlakyDetailHandler;

    fn services() -> DriverServices {
        let clock = Arc::new(SystemClock);
        DriverServices {
            tasks: Arc::new(InMemoryTaskStore::new(clock.clone())),
            schedules: Arc::new(ScheduleAdapter::new(
                Arc::new(InMemoryScheduleBackend::new()),
                Arc::new(RecordingNotifier::default()),
                clock,
                ScheduleSettings::from_config(&SchedulerConfig::default()).unwrap(),
            )),
            sink: Arc::new(RecordingSink::default()),
        }
    }

    #[test]
    fn build_with_every_expected_kind() {
        let app = AppBuilder::new()
            .register::<ScrapingDetail, _>(FlakyDetailHandler)
            .unwrap()
            .expect_kinds(&[TaskKind::ScrapingDetail])
            .build(services())
            .unwrap();

        assert_eq!(app.kinds(), vec![TaskKind::ScrapingDetail]);
        assert_eq!(app.driver(TaskKind::ScrapingDetail).unwrap().kind(), TaskKind::ScrapingDetail);
        assert!(matches!(
            app.driver(TaskKind::RegisterPages),
            Err(BuildError::NotRegistered(TaskKind::RegisterPages))
        ));
    }

    #[test]
    fn missing_kinds_fail_the_build() {
        let result = AppBuilder::new()
            .register::<ScrapingDetail, _>(FlakyDetailHandler)
            .unwrap()
            .expect_kinds(&TaskKind::ALL)
            .build(services());
        assert!(matches!(
            result,
            Err(BuildError::MissingTaskKinds(missing))
                if missing == vec![TaskKind::RegisterPages, TaskKind::ScrapingAbstract]
        ));
    }

    #[test]
    fn without_expectations_anything_builds() {
        assert!(AppBuilder::new().build(services()).is_ok());
    }
}

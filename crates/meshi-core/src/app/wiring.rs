//! Wiring - 設定から実装を選んで組み立てる
//!
//! CLI の各サブコマンドは `Services::from_config` で依存を揃え、必要な
//! driver / job / runner / API 状態をここから取り出します。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use object_store::ObjectStore;
use object_store::path::Path;
use thiserror::Error;

use super::builder::{App, AppBuilder, BuildError, DriverServices};
use super::driver::LifecycleDriver;
use super::handlers::{RegisterPagesHandler, ScrapingAbstractHandler, ScrapingDetailHandler};
use super::invocation::{Invocation, JobTarget};
use super::notify_new::NewRestaurantNotifier;
use super::runner::ScheduleRunner;
use super::schedules::{FanOut, ScheduleAdapter, ScheduleSettings};
use crate::api::ApiState;
use crate::config::{AppConfig, ConfigError, DatabaseMode, ScheduleBackendKind, TaskBackend};
use crate::domain::errors::{DbError, SchedulerError, StoreError, ValidationError};
use crate::domain::payload::{RegisterPages, ScrapingAbstract, ScrapingDetail};
use crate::domain::task::TaskKind;
use crate::impls::{
    BlobError, BlobErrorSink, BlobLock, BlobScheduleBackend, BlobTaskStore, CachedSecret,
    CachingGeocoder, EnvSecret, GoogleGeocoder, HotPepperSite, HttpProxyDatabase,
    InMemoryScheduleBackend, InMemoryTaskStore, LockSettings, SingleFileDatabase, SqlTaskStore,
    TracingNotifier, WebhookNotifier, resolve_object_store,
};
use crate::ports::{
    Clock, Database, ErrorSink, Geocoder, IdGenerator, ListingSite, Notifier, ScheduleBackend,
    SecretSource, Severity, SystemClock, TaskStore, UlidGenerator,
};
use crate::repo::{MasterRow, MasterTable, SQLITE_SCHEMA, reference};
use crate::typed::{RegistryError, Task};

/// 新着通知 job の target 名
pub const NOTIFY_NEW_TARGET: &str = "NotifyNewRestaurants";

#[derive(Debug, Error)]
pub enum WiringError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// 運用コマンド（初期化・投入・取り込み）のエラー
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("small area `{0}` is not in the area master tables")]
    UnknownArea(String),

    #[error("init-db only applies to the single_file database mode")]
    NotSingleFile,

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// `enqueue register-pages` の結果
#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub keys: Vec<String>,
    pub inserted: usize,
    pub fan_out: Option<FanOut>,
}

pub struct Services {
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub store: Arc<dyn ObjectStore>,
    pub db: Arc<dyn Database>,
    single_file: Option<Arc<SingleFileDatabase>>,
    pub tasks: Arc<dyn TaskStore>,
    pub schedule_backend: Arc<dyn ScheduleBackend>,
    pub schedules: Arc<ScheduleAdapter>,
    pub notifier: Arc<dyn Notifier>,
    pub sink: Arc<dyn ErrorSink>,
    pub site: Arc<dyn ListingSite>,
    pub geocoder: Arc<dyn Geocoder>,
}

impl Services {
    pub fn from_config(config: AppConfig) -> Result<Self, WiringError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));
        let store = resolve_object_store(&config.blob)?;
        let http = reqwest::Client::builder()
            .user_agent(config.listing.user_agent.clone())
            .build()?;

        let (db, single_file) = match config.database.mode {
            DatabaseMode::SingleFile => {
                let lock = BlobLock::new(
                    store.clone(),
                    Path::from(config.database.lock.as_str()),
                    LockSettings {
                        poll_interval: config.database.poll_interval(),
                        max_wait: config.database.max_wait(),
                        mode: config.database.lock_mode,
                    },
                    ids.clone(),
                );
                let db = Arc::new(SingleFileDatabase::new(
                    store.clone(),
                    Path::from(config.database.file.as_str()),
                    lock,
                ));
                (db.clone() as Arc<dyn Database>, Some(db))
            }
            DatabaseMode::HttpProxy => {
                let proxy = &config.database.proxy;
                let key: Arc<dyn SecretSource> = Arc::new(CachedSecret::new(
                    Arc::new(EnvSecret::new(proxy.api_key_env.clone())),
                    Duration::from_secs(proxy.key_ttl_secs),
                ));
                let db = HttpProxyDatabase::new(http.clone(), proxy.url.clone(), proxy.env.clone(), key);
                (Arc::new(db) as Arc<dyn Database>, None)
            }
        };

        let tasks: Arc<dyn TaskStore> = match config.tasks.backend {
            TaskBackend::Database => Arc::new(SqlTaskStore::new(db.clone(), clock.clone())),
            TaskBackend::Blob => Arc::new(BlobTaskStore::new(
                store.clone(),
                config.tasks.prefix.clone(),
                clock.clone(),
            )),
            TaskBackend::Memory => Arc::new(InMemoryTaskStore::new(clock.clone())),
        };

        let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
            Some(url) => {
                let n = &config.notify;
                let tokens: HashMap<Severity, Arc<dyn SecretSource>> = HashMap::from([
                    (Severity::Normal, env_secret(&n.normal_token_env)),
                    (Severity::Error, env_secret(&n.error_token_env)),
                    (Severity::Warning, env_secret(&n.warning_token_env)),
                ]);
                Arc::new(WebhookNotifier::new(http.clone(), url.clone(), tokens, n.max_chars))
            }
            None => Arc::new(TracingNotifier {
                max_chars: config.notify.max_chars,
            }),
        };
        let sink: Arc<dyn ErrorSink> = Arc::new(BlobErrorSink::new(
            store.clone(),
            config.errors.prefix.clone(),
            notifier.clone(),
            clock.clone(),
            ids.clone(),
        ));

        let schedule_backend: Arc<dyn ScheduleBackend> = match config.scheduler.backend {
            ScheduleBackendKind::Blob => Arc::new(BlobScheduleBackend::new(
                store.clone(),
                config.scheduler.prefix.clone(),
            )),
            ScheduleBackendKind::Memory => Arc::new(InMemoryScheduleBackend::new()),
        };
        let schedules = Arc::new(ScheduleAdapter::new(
            schedule_backend.clone(),
            notifier.clone(),
            clock.clone(),
            ScheduleSettings::from_config(&config.scheduler)?,
        ));

        let site: Arc<dyn ListingSite> = Arc::new(HotPepperSite::new(
            http.clone(),
            config.listing.base_url.clone(),
            Duration::from_millis(config.listing.request_delay_ms),
        ));
        let geocoder: Arc<dyn Geocoder> = Arc::new(CachingGeocoder::new(
            Arc::new(GoogleGeocoder::new(
                http,
                config.geocoder.endpoint.clone(),
                env_secret(&config.geocoder.api_key_env),
            )),
            store.clone(),
            config.geocoder.cache_prefix.clone(),
        ));

        Ok(Self {
            config,
            clock,
            ids,
            store,
            db,
            single_file,
            tasks,
            schedule_backend,
            schedules,
            notifier,
            sink,
            site,
            geocoder,
        })
    }

    /// 3 つの kind の handler を登録した App
    pub fn app(&self) -> Result<App, WiringError> {
        let app = AppBuilder::new()
            .register::<RegisterPages, _>(RegisterPagesHandler::new(self.site.clone()))?
            .register::<ScrapingAbstract, _>(ScrapingAbstractHandler::new(
                self.site.clone(),
                self.db.clone(),
            ))?
            .register::<ScrapingDetail, _>(ScrapingDetailHandler::new(
                self.site.clone(),
                self.geocoder.clone(),
                self.db.clone(),
            ))?
            .expect_kinds(&TaskKind::ALL)
            .build(DriverServices {
                tasks: self.tasks.clone(),
                schedules: self.schedules.clone(),
                sink: self.sink.clone(),
            })?;
        Ok(app)
    }

    pub fn invocation(&self, function_name: &str) -> Invocation {
        Invocation::new(function_name, self.sink.clone(), self.ids.clone())
    }

    pub fn driver_target(&self, kind: TaskKind) -> Result<JobTarget<LifecycleDriver>, WiringError> {
        let driver = self.app()?.driver(kind)?;
        Ok(JobTarget::new(driver, self.invocation(kind.as_str())))
    }

    pub fn notify_target(&self) -> JobTarget<NewRestaurantNotifier> {
        let job = NewRestaurantNotifier::new(
            self.db.clone(),
            self.notifier.clone(),
            self.config.listing.base_url.clone(),
        );
        JobTarget::new(job, self.invocation(NOTIFY_NEW_TARGET))
    }

    /// 3 つの driver と新着通知を target に持つ runner
    pub fn runner(&self) -> Result<ScheduleRunner, WiringError> {
        let mut runner = ScheduleRunner::new(self.schedule_backend.clone(), self.schedules.group());
        for kind in TaskKind::ALL {
            runner = runner.with_target(Arc::new(self.driver_target(kind)?));
        }
        Ok(runner.with_target(Arc::new(self.notify_target())))
    }

    pub fn api_state(&self) -> ApiState {
        ApiState::new(
            self.db.clone(),
            self.sink.clone(),
            self.config.api.allowed_origins.clone(),
        )
    }

    pub async fn init_db(&self) -> Result<(), OperationError> {
        let db = self.single_file.as_ref().ok_or(OperationError::NotSingleFile)?;
        db.bootstrap(SQLITE_SCHEMA).await?;
        Ok(())
    }

    /// 小エリアコードから系譜を引いて RegisterPages を投入する
    ///
    /// `fan_out` なら 1 件ずつ 1 分刻みの one-shot で起こし、そうでなければ毎分の arm。
    pub async fn enqueue_register_pages(
        &self,
        small_area_codes: &[String],
        fan_out: bool,
    ) -> Result<Enqueued, OperationError> {
        let mut tasks = Vec::with_capacity(small_area_codes.len());
        for code in small_area_codes {
            let area = reference::area_path(self.db.as_ref(), code)
                .await?
                .ok_or_else(|| OperationError::UnknownArea(code.clone()))?;
            tasks.push(RegisterPages { area }.to_new_task()?);
        }
        let keys: Vec<String> = tasks.iter().map(|t| t.key.clone()).collect();
        let inserted = self.tasks.enqueue(&tasks).await?;

        let fan_out = if fan_out {
            Some(self.schedules.fan_out(TaskKind::RegisterPages, &keys).await?)
        } else {
            self.schedules.arm(TaskKind::RegisterPages).await?;
            None
        };
        tracing::info!(requested = keys.len(), inserted, "register-pages enqueued");
        Ok(Enqueued {
            keys,
            inserted,
            fan_out,
        })
    }

    pub async fn import_reference(&self, table: MasterTable, rows: &[MasterRow]) -> Result<u64, OperationError> {
        Ok(reference::upsert(self.db.as_ref(), table, rows).await?)
    }
}

fn env_secret(var: &str) -> Arc<dyn SecretSource> {
    Arc::new(EnvSecret::new(var))
}

//! Impls - ports の具体実装
//!
//! blob store（object_store）、SQLite、HTTP（reqwest）、in-memory の各アダプタ。
//! どれもコンストラクタで依存を受け取り、モジュールレベルの状態は持ちません。

pub mod blob;
pub mod blob_lock;
pub mod blob_schedules;
pub mod blob_task_store;
pub mod error_sink;
pub mod geocoder;
pub mod hotpepper;
pub mod http_proxy_db;
pub mod inmem_schedules;
pub mod inmem_task_store;
pub mod notifier;
pub mod secret;
pub mod single_file_db;
pub mod sql_task_store;

pub use self::blob::{BlobError, child_path, resolve_object_store};
pub use self::blob_lock::{BlobLock, LockSettings};
pub use self::blob_schedules::BlobScheduleBackend;
pub use self::blob_task_store::BlobTaskStore;
pub use self::error_sink::BlobErrorSink;
pub use self::geocoder::{CachingGeocoder, GoogleGeocoder};
pub use self::hotpepper::HotPepperSite;
pub use self::http_proxy_db::HttpProxyDatabase;
pub use self::inmem_schedules::InMemoryScheduleBackend;
pub use self::inmem_task_store::InMemoryTaskStore;
pub use self::notifier::{TracingNotifier, WebhookNotifier};
pub use self::secret::{CachedSecret, EnvSecret, StaticSecret};
pub use self::single_file_db::SingleFileDatabase;
pub use self::sql_task_store::SqlTaskStore;

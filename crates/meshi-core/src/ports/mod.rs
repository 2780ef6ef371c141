//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」です。外部システム（blob store、
//! リレーショナルストア、スケジューラ、掲載サイト、ジオコーダ、通知チャネル）への
//! インターフェースを trait で定義し、実装は `impls` に置きます。
//!
//! # 設計原則
//! - 依存はすべてコンストラクタで明示的に渡す（モジュールレベルのクライアントは持たない）
//! - テストでは in-memory 実装か wiremock 越しの実装に差し替える

pub mod clock;
pub mod database;
pub mod geocoder;
pub mod id_generator;
pub mod listing;
pub mod notifier;
pub mod scheduler;
pub mod secret;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::database::{Database, Dialect, Row, SqlValue, Statement};
pub use self::geocoder::Geocoder;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::listing::ListingSite;
pub use self::notifier::{ErrorSink, Notifier, Severity, notify_best_effort, prepare_message};
pub use self::scheduler::{Schedule, ScheduleBackend, Trigger};
pub use self::secret::SecretSource;
pub use self::task_store::TaskStore;

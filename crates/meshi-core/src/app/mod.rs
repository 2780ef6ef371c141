//! App - アプリケーション層
//!
//! ports を組み合わせて compute unit 1 回分の処理を組み立てます。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: handler の登録と起動時検証、kind ごとの driver の生成
//! - **LifecycleDriver**: 1 invocation で 1 task を進める
//! - **ScheduleAdapter**: arm / disarm / 分散登録
//! - **Invocation**: 失敗を ErrorSink に送り、常に 200 を返す境界
//! - **ScheduleRunner / SchedulerLoop**: 期限の来たスケジュールを発火させる
//! - **NewRestaurantNotifier**: 新着店舗の通知 job
//! - **Services**: 設定から実装を選んで上の部品を組み立てる

pub mod builder;
pub mod driver;
pub mod handlers;
pub mod invocation;
pub mod notify_new;
pub mod runner;
pub mod schedules;
pub mod wiring;

pub use self::builder::{App, AppBuilder, BuildError, DriverServices};
pub use self::driver::{DriverError, DriverReport, LifecycleDriver};
pub use self::handlers::{RegisterPagesHandler, ScrapingAbstractHandler, ScrapingDetailHandler};
pub use self::invocation::{Envelope, Invocation, Job, JobTarget, Target};
pub use self::notify_new::{NewRestaurantNotifier, NotifyNewError};
pub use self::runner::{ScheduleRunner, SchedulerLoop, TickReport};
pub use self::schedules::{FanOut, Registration, Removal, ScheduleAdapter, ScheduleSettings};
pub use self::wiring::{Enqueued, OperationError, Services, WiringError};

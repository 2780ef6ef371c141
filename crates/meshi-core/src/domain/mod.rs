//! Domain model (ids, tasks, outcomes, areas, restaurants, errors).
//!
//! ここには I/O を持たない型だけを置きます。

pub mod area;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod payload;
pub mod restaurant;
pub mod task;

pub use area::AreaPath;
pub use errors::{
    BoxError, DbError, ExtractError, GeocodeError, LockError, NotifyError, SchedulerError,
    SecretError, StoreError, ValidationError,
};
pub use ids::{InvocationId, LockToken, ReportId};
pub use outcome::{WorkError, WorkOutcome};
pub use payload::{RegisterPages, ScrapingAbstract, ScrapingDetail};
pub use restaurant::{
    DetailInfo, ImageRef, ImageSummary, ListingEntry, NewRestaurant, RestaurantDetail, SearchHit,
};
pub use task::{NewTask, StoredTask, TaskKind};

//! Repository - 業務 SQL
//!
//! `Database` port の上に、店舗・参照データの読み書きを関数として並べます。
//! SQL は `?` プレースホルダで書き、方言差は `Dialect` に寄せます。

pub mod reference;
pub mod restaurants;
pub mod schema;

pub use self::reference::{MasterRow, MasterTable};
pub use self::restaurants::{CompletedDetail, SEARCH_LIMIT};
pub use self::schema::SQLITE_SCHEMA;

//! Errors - 境界ごとのエラー型
//!
//! 各 port / adapter の境界は `thiserror` の enum を 1 つずつ持ちます。
//! 「リトライで直るか」の判定はここでは行わず、`WorkError` への変換
//! （`domain::outcome`）で一箇所にまとめます。

use std::time::Duration;
use thiserror::Error;

use super::task::TaskKind;

/// 下位ライブラリのエラーを型消去して保持するためのエイリアス
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Blob store 上のロックマーカーに関するエラー
#[derive(Debug, Error)]
pub enum LockError {
    /// 最大待ち時間を過ぎてもマーカーが消えなかった
    #[error("lock `{name}` still held after waiting {waited:?}")]
    Timeout { name: String, waited: Duration },

    #[error("blob store error on lock `{name}`: {source}")]
    Backend {
        name: String,
        #[source]
        source: BoxError,
    },
}

/// Database port のエラー
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("database file `{0}` does not exist in the blob store")]
    FileMissing(String),

    #[error("blob transfer failed: {0}")]
    Transfer(#[source] BoxError),

    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking worker failed: {0}")]
    Join(String),

    #[error("relational proxy answered {status}: {body}")]
    Proxy { status: u16, body: String },

    #[error("relational proxy unreachable: {0}")]
    Http(#[source] BoxError),

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("column `{column}` is missing or not {expected}")]
    Column {
        column: String,
        expected: &'static str,
    },
}

/// 認証情報の取得エラー
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("environment variable `{0}` is not set")]
    MissingEnv(String),

    #[error("secret `{0}` is empty")]
    Empty(String),
}

/// Task store のエラー
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("blob store error: {0}")]
    Blob(#[source] BoxError),

    #[error("task codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("corrupt task row: {0}")]
    Corrupt(String),
}

/// Schedule backend のエラー
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("schedule `{group}/{name}` not found")]
    NotFound { group: String, name: String },

    #[error("schedule `{group}/{name}` already exists")]
    Conflict { group: String, name: String },

    #[error("schedule backend error: {0}")]
    Backend(#[source] BoxError),

    #[error("schedule codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// ページ取得・抽出のエラー
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    /// 期待したマークアップが存在しない（サイト側の変更を疑う）
    #[error("`{what}` not found in {url}")]
    Missing { what: &'static str, url: String },

    /// マークアップはあるが中身が期待した形をしていない
    #[error("`{what}` did not match the expected pattern: {text}")]
    Pattern { what: &'static str, text: String },
}

/// ジオコーディングのエラー
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Http(#[source] BoxError),

    #[error("geocoder answered {0}")]
    Status(u16),

    #[error("no coordinates for address `{0}`")]
    NoResult(String),

    #[error("geocode cache error: {0}")]
    Cache(#[source] BoxError),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// 通知チャネルのエラー
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[source] BoxError),

    #[error("notification endpoint answered {0}")]
    Status(u16),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// Task payload の検証エラー
///
/// 未知のフィールドや形式違反は副作用の前に必ずここで落とします。
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("payload does not match the schema: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("field `{field}` has an invalid value `{value}`")]
    Field { field: &'static str, value: String },

    #[error("stored key `{stored}` does not match payload key `{derived}`")]
    KeyMismatch { stored: String, derived: String },

    #[error("unknown task kind `{0}`")]
    UnknownKind(String),

    #[error("task of kind `{actual}` handed to the `{expected}` decoder")]
    WrongKind {
        expected: TaskKind,
        actual: TaskKind,
    },
}

impl ValidationError {
    pub fn field(field: &'static str, value: impl Into<String>) -> Self {
        Self::Field {
            field,
            value: value.into(),
        }
    }
}

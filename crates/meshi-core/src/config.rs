//! Config - TOML 設定
//!
//! 各セクションは `#[serde(default)]` で、書かなかった項目は既定値になります。
//! 認証情報そのものは書かず、値を持つ環境変数の名前だけを書きます。
//!
//! ```toml
//! [blob]
//! backend = "s3"
//! bucket = "meshi-data"
//!
//! [database]
//! poll_interval_ms = 300
//! max_wait_secs = 120
//!
//! [scheduler.anchors]
//! RegisterPages = "01:00"
//! ```

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::domain::task::TaskKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub blob: BlobConfig,
    pub database: DatabaseConfig,
    pub tasks: TaskStoreConfig,
    pub scheduler: SchedulerConfig,
    pub listing: ListingConfig,
    pub geocoder: GeocoderConfig,
    pub notify: NotifyConfig,
    pub errors: ErrorLogConfig,
    pub api: ApiConfig,
}

impl AppConfig {
    /// `path` が None なら既定値。指定したファイルが無いのはエラー
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.poll_interval_ms == 0 {
            return Err(invalid("database.poll_interval_ms", "must be positive"));
        }
        if !(-12..=14).contains(&self.scheduler.utc_offset_hours) {
            return Err(invalid("scheduler.utc_offset_hours", "out of range"));
        }
        for kind in self.scheduler.anchors.keys() {
            self.scheduler.anchor(*kind)?;
        }
        if self.blob.backend == BlobBackend::S3 && self.blob.bucket.is_none() {
            return Err(invalid("blob.bucket", "required for the s3 backend"));
        }
        if self.database.mode == DatabaseMode::HttpProxy && self.database.proxy.url.is_empty() {
            return Err(invalid("database.proxy.url", "required for the http_proxy mode"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackend {
    Memory,
    Fs,
    S3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlobConfig {
    pub backend: BlobBackend,
    /// fs backend のルートディレクトリ
    pub root: String,
    pub bucket: Option<String>,
    pub region: Option<String>,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackend::Fs,
            root: "./data".to_string(),
            bucket: None,
            region: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseMode {
    SingleFile,
    HttpProxy,
}

/// ロックマーカーの作り方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// 条件付き作成（create-if-absent）。未対応の store では head-then-put に落ちる
    Conditional,
    /// 存在確認してから作成。確認と作成の間の競合は許容する
    HeadThenPut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub mode: DatabaseMode,
    /// blob store 上の SQLite ファイル
    pub file: String,
    /// ロックマーカーの object 名
    pub lock: String,
    pub lock_mode: LockMode,
    pub poll_interval_ms: u64,
    pub max_wait_secs: u64,
    pub proxy: ProxyConfig,
}

impl DatabaseConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            mode: DatabaseMode::SingleFile,
            file: "meshi.sqlite3".to_string(),
            lock: "meshi.sqlite3.lock".to_string(),
            lock_mode: LockMode::Conditional,
            poll_interval_ms: 300,
            max_wait_secs: 120,
            proxy: ProxyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    pub url: String,
    /// `Env` ヘッダの値
    pub env: String,
    pub api_key_env: String,
    pub key_ttl_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            env: "dev".to_string(),
            api_key_env: "MESHI_DB_API_KEY".to_string(),
            key_ttl_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskBackend {
    /// `update_tasks` テーブル
    Database,
    /// blob store 上のキー付き JSON
    Blob,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskStoreConfig {
    pub backend: TaskBackend,
    pub prefix: String,
}

impl Default for TaskStoreConfig {
    fn default() -> Self {
        Self {
            backend: TaskBackend::Database,
            prefix: "tasks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleBackendKind {
    Blob,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub backend: ScheduleBackendKind,
    pub group: String,
    pub identity: String,
    pub prefix: String,
    /// anchor 時刻を解釈するタイムゾーン（JST なら 9）
    pub utc_offset_hours: i32,
    pub tick_secs: u64,
    /// kind ごとの分散登録の起点（"HH:MM"）
    pub anchors: BTreeMap<TaskKind, String>,
}

impl SchedulerConfig {
    pub fn anchor(&self, kind: TaskKind) -> Result<NaiveTime, ConfigError> {
        let raw = self
            .anchors
            .get(&kind)
            .map(String::as_str)
            .unwrap_or(DEFAULT_ANCHOR);
        NaiveTime::parse_from_str(raw, "%H:%M").map_err(|e| ConfigError::Invalid {
            field: format!("scheduler.anchors.{kind}"),
            reason: e.to_string(),
        })
    }
}

const DEFAULT_ANCHOR: &str = "00:10";

impl Default for SchedulerConfig {
    fn default() -> Self {
        let anchors = BTreeMap::from([
            (TaskKind::RegisterPages, "01:00".to_string()),
            (TaskKind::ScrapingAbstract, "00:10".to_string()),
            (TaskKind::ScrapingDetail, "00:10".to_string()),
        ]);
        Self {
            backend: ScheduleBackendKind::Blob,
            group: "meshi".to_string(),
            identity: "meshi-runner".to_string(),
            prefix: "schedules".to_string(),
            utc_offset_hours: 9,
            tick_secs: 60,
            anchors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListingConfig {
    pub base_url: String,
    pub user_agent: String,
    /// 同じサイトへの連続リクエストの間隔
    pub request_delay_ms: u64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.hotpepper.jp".to_string(),
            user_agent: concat!("meshi/", env!("CARGO_PKG_VERSION")).to_string(),
            request_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeocoderConfig {
    pub endpoint: String,
    pub api_key_env: String,
    pub cache_prefix: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            api_key_env: "MESHI_GEOCODER_API_KEY".to_string(),
            cache_prefix: "geocode".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    /// 未設定ならログに出すだけ
    pub webhook_url: Option<String>,
    pub normal_token_env: String,
    pub error_token_env: String,
    pub warning_token_env: String,
    pub max_chars: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            normal_token_env: "MESHI_NOTIFY_TOKEN".to_string(),
            error_token_env: "MESHI_NOTIFY_ERROR_TOKEN".to_string(),
            warning_token_env: "MESHI_NOTIFY_WARNING_TOKEN".to_string(),
            max_chars: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ErrorLogConfig {
    pub prefix: String,
}

impl Default for ErrorLogConfig {
    fn default() -> Self {
        Self {
            prefix: "error_logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub bind: String,
    pub allowed_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.database.poll_interval(), Duration::from_millis(300));
        assert_eq!(config.notify.max_chars, 1000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [blob]
            backend = "s3"
            bucket = "meshi-data"

            [database]
            max_wait_secs = 5

            [scheduler.anchors]
            RegisterPages = "02:30"

            [api]
            allowed_origins = ["https://meshi.example"]
            "#,
        )
        .unwrap();

        assert_eq!(config.blob.backend, BlobBackend::S3);
        assert_eq!(config.database.max_wait(), Duration::from_secs(5));
        assert_eq!(config.database.poll_interval_ms, 300);
        assert_eq!(
            config.scheduler.anchor(TaskKind::RegisterPages).unwrap(),
            NaiveTime::from_hms_opt(2, 30, 0).unwrap()
        );
        // 書かなかった kind は既定の起点
        assert_eq!(
            config.scheduler.anchor(TaskKind::ScrapingDetail).unwrap(),
            NaiveTime::from_hms_opt(0, 10, 0).unwrap()
        );
        assert_eq!(config.api.allowed_origins, vec!["https://meshi.example"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(AppConfig::from_toml("[database]\npoll = 1\n").is_err());
    }

    #[test]
    fn bad_anchor_is_rejected() {
        let err = AppConfig::from_toml("[scheduler.anchors]\nScrapingDetail = \"25:00\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field.ends_with("ScrapingDetail")));
    }

    #[test]
    fn s3_requires_a_bucket() {
        assert!(AppConfig::from_toml("[blob]\nbackend = \"s3\"\n").is_err());
    }
}

//! Notifier / ErrorSink port - 外向きの通知と失敗のエスカレーション
//!
//! # 設計原則
//! - Notifier は失敗を返す（新着通知のように「送れたら次へ進む」処理があるため）
//! - ErrorSink は失敗を返さない。報告経路の障害で呼び出し元を落とさない

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::NotifyError;

/// 通知の重要度（チャネル側ではグループの振り分けに使う）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Normal => "normal",
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        f.write_str(s)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, severity: Severity, message: &str) -> Result<(), NotifyError>;
}

/// 送れなくてもログに残すだけで呼び出し元には返さない
pub async fn notify_best_effort(notifier: &dyn Notifier, severity: Severity, message: &str) {
    if let Err(e) = notifier.notify(severity, message).await {
        tracing::warn!(%severity, error = %e, "notification dropped");
    }
}

/// 送信前の整形: 前後の空白を落とし、先頭に改行を付け、`max_chars` 文字で切る
///
/// 文字数で数えるので UTF-8 の途中で切れることはない。
pub fn prepare_message(message: &str, max_chars: usize) -> String {
    let body = format!("\n{}", message.trim());
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => body[..cut].to_string(),
        None => body,
    }
}

#[async_trait]
pub trait ErrorSink: Send + Sync {
    /// fire-and-forget。内部の失敗はログに落として握りつぶす
    async fn report(&self, function_name: &str, message: &str);
}

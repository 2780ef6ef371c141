//! BlobErrorSink - 失敗の記録とエスカレーション
//!
//! 1. `{prefix}/{YYYY-MM-DD HH:MM:SS}_{function}_{report id}.txt` に本文を置く
//!    （同じ秒に同じ関数から 2 件来ても上書きしない）
//! 2. Error の重要度で通知する
//!
//! どちらが失敗しても呼び出し元には返さない（ログに残すだけ）。

use std::sync::Arc;

use async_trait::async_trait;
use object_store::{ObjectStore, PutPayload};

use crate::impls::blob::child_path;
use crate::ports::{Clock, ErrorSink, IdGenerator, Notifier, Severity, notify_best_effort};

pub struct BlobErrorSink {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl BlobErrorSink {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        prefix: impl Into<String>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            notifier,
            clock,
            ids,
        }
    }
}

pub fn format_report(function_name: &str, message: &str) -> String {
    format!("\n{message}\n\n関数名：{function_name}\n")
}

#[async_trait]
impl ErrorSink for BlobErrorSink {
    async fn report(&self, function_name: &str, message: &str) {
        let body = format_report(function_name, message);
        let stamp = self.clock.now().format("%Y-%m-%d %H:%M:%S");
        let id = self.ids.report_id();
        let path = child_path(&self.prefix, &[&format!("{stamp}_{function_name}_{id}.txt")]);

        tracing::error!(function = function_name, message, "failure reported");
        if let Err(e) = self
            .store
            .put(&path, PutPayload::from(body.clone().into_bytes()))
            .await
        {
            tracing::warn!(%path, error = %e, "error log upload failed");
        }
        notify_best_effort(self.notifier.as_ref(), Severity::Error, &body).await;
    }
}

/// テスト用: 報告を覚えておく
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub reports: tokio::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl RecordingSink {
    pub async fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().await.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ErrorSink for RecordingSink {
    async fn report(&self, function_name: &str, message: &str) {
        self.reports
            .lock()
            .await
            .push((function_name.to_string(), message.to_string()));
    }
}

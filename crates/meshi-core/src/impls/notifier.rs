//! Notifier の実装
//!
//! - `WebhookNotifier`: 重要度ごとのトークンで Bearer 認証し、`message` をフォームで POST する
//! - `TracingNotifier`: 送り先を設定していない環境用。ログに出すだけ

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::NotifyError;
use crate::ports::{Notifier, SecretSource, Severity, prepare_message};

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    tokens: HashMap<Severity, Arc<dyn SecretSource>>,
    max_chars: usize,
}

impl WebhookNotifier {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        tokens: HashMap<Severity, Arc<dyn SecretSource>>,
        max_chars: usize,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            tokens,
            max_chars,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, severity: Severity, message: &str) -> Result<(), NotifyError> {
        let token = match self.tokens.get(&severity) {
            Some(source) => source.fetch().await?,
            None => {
                return Err(NotifyError::Secret(
                    crate::domain::errors::SecretError::MissingEnv(format!("{severity} token")),
                ));
            }
        };
        let message = prepare_message(message, self.max_chars);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .form(&[("message", message.as_str())])
            .send()
            .await
            .map_err(|e| NotifyError::Http(Box::new(e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        tracing::debug!(%severity, chars = message.chars().count(), "notification sent");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier {
    pub max_chars: usize,
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, severity: Severity, message: &str) -> Result<(), NotifyError> {
        let message = prepare_message(message, self.max_chars.max(1));
        match severity {
            Severity::Error => tracing::error!(%severity, message = %message, "notify"),
            Severity::Warning => tracing::warn!(%severity, message = %message, "notify"),
            Severity::Normal => tracing::info!(%severity, message = %message, "notify"),
        }
        Ok(())
    }
}

/// テスト用: 送った内容を覚えておく。`fail` なら常に失敗する
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub sent: tokio::sync::Mutex<Vec<(Severity, String)>>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn messages(&self) -> Vec<(Severity, String)> {
        self.sent.lock().await.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, severity: Severity, message: &str) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Status(503));
        }
        self.sent.lock().await.push((severity, message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::secret::StaticSecret;
    use wiremock::matchers::{body_string_contains, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer) -> WebhookNotifier {
        let tokens: HashMap<Severity, Arc<dyn SecretSource>> = HashMap::from([
            (
                Severity::Normal,
                Arc::new(StaticSecret::new("normal-token")) as Arc<dyn SecretSource>,
            ),
            (
                Severity::Error,
                Arc::new(StaticSecret::new("error-token")) as Arc<dyn SecretSource>,
            ),
        ]);
        WebhookNotifier::new(reqwest::Client::new(), server.uri(), tokens, 1000)
    }

    #[tokio::test]
    async fn severity_selects_the_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer error-token"))
            .and(body_string_contains("message="))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server)
            .notify(Severity::Error, "  lock timed out  ")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_token_and_bad_status_are_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let notifier = notifier(&server);
        assert!(matches!(
            notifier.notify(Severity::Warning, "x").await,
            Err(NotifyError::Secret(_))
        ));
        assert!(matches!(
            notifier.notify(Severity::Normal, "x").await,
            Err(NotifyError::Status(401))
        ));
    }
}

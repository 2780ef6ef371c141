//! BlobLock - blob store のマーカー object による排他
//!
//! # プロトコル
//! 1. マーカーを作れるまで `poll_interval` ごとに再試行する
//! 2. `max_wait` を超えたら `LockError::Timeout`（無限には待たない）
//! 3. 作れたらロック取得。解放はマーカーの削除
//!
//! # 既知の制約
//! - マーカーに有効期限は無い。取得から解放の間にプロセスが強制終了されると
//!   マーカーが残り、手動で消すまで書き込みは全てタイムアウトする
//! - `LockMode::HeadThenPut`（または条件付き作成に未対応の store）では
//!   存在確認と作成の間に割り込まれる可能性がある

use std::sync::Arc;
use std::time::Duration;

use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutPayload};
use tokio::time::{Instant, sleep};

use crate::config::LockMode;
use crate::domain::errors::LockError;
use crate::domain::ids::LockToken;
use crate::ports::IdGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub mode: LockMode,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            max_wait: Duration::from_secs(120),
            mode: LockMode::Conditional,
        }
    }
}

pub struct BlobLock {
    store: Arc<dyn ObjectStore>,
    marker: Path,
    settings: LockSettings,
    ids: Arc<dyn IdGenerator>,
}

impl BlobLock {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        marker: Path,
        settings: LockSettings,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            marker,
            settings,
            ids,
        }
    }

    pub fn name(&self) -> &str {
        self.marker.as_ref()
    }

    /// マーカーを作れるまで待つ
    pub async fn acquire(&self) -> Result<LockToken, LockError> {
        let token = self.ids.lock_token();
        let started = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if self.try_create(&token).await? {
                tracing::debug!(
                    lock = %self.marker,
                    %token,
                    attempts,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "lock acquired"
                );
                return Ok(token);
            }

            let waited = started.elapsed();
            if waited >= self.settings.max_wait {
                tracing::warn!(lock = %self.marker, attempts, waited_ms = waited.as_millis() as u64, "lock wait timed out");
                return Err(LockError::Timeout {
                    name: self.marker.to_string(),
                    waited,
                });
            }
            let remaining = self.settings.max_wait - waited;
            sleep(self.settings.poll_interval.min(remaining)).await;
        }
    }

    /// マーカーを消す。既に無くてもエラーにしない
    pub async fn release(&self, token: &LockToken) -> Result<(), LockError> {
        match self.store.delete(&self.marker).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {
                tracing::debug!(lock = %self.marker, %token, "lock released");
                Ok(())
            }
            Err(e) => Err(self.backend_error(e)),
        }
    }

    pub async fn is_held(&self) -> Result<bool, LockError> {
        match self.store.head(&self.marker).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(self.backend_error(e)),
        }
    }

    async fn try_create(&self, token: &LockToken) -> Result<bool, LockError> {
        if self.settings.mode == LockMode::HeadThenPut {
            return self.head_then_put(token).await;
        }
        let body = PutPayload::from(token.to_string().into_bytes());
        match self
            .store
            .put_opts(&self.marker, body, PutMode::Create.into())
            .await
        {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. })
            | Err(object_store::Error::Precondition { .. }) => Ok(false),
            Err(object_store::Error::NotImplemented) => self.head_then_put(token).await,
            Err(e) => Err(self.backend_error(e)),
        }
    }

    async fn head_then_put(&self, token: &LockToken) -> Result<bool, LockError> {
        if self.is_held().await? {
            return Ok(false);
        }
        let body = PutPayload::from(token.to_string().into_bytes());
        self.store
            .put(&self.marker, body)
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(true)
    }

    fn backend_error(&self, e: object_store::Error) -> LockError {
        LockError::Backend {
            name: self.marker.to_string(),
            source: Box::new(e),
        }
    }
}

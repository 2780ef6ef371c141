//! SecretSource の実装
//!
//! - `EnvSecret`: 環境変数から読む
//! - `StaticSecret`: 固定値（テスト・ローカル用）
//! - `CachedSecret`: 下位の source を TTL 付きでキャッシュする

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::errors::SecretError;
use crate::ports::SecretSource;

pub struct EnvSecret {
    var: String,
}

impl EnvSecret {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl SecretSource for EnvSecret {
    async fn fetch(&self) -> Result<String, SecretError> {
        let value =
            std::env::var(&self.var).map_err(|_| SecretError::MissingEnv(self.var.clone()))?;
        if value.trim().is_empty() {
            return Err(SecretError::Empty(self.var.clone()));
        }
        Ok(value)
    }
}

pub struct StaticSecret(String);

impl StaticSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

#[async_trait]
impl SecretSource for StaticSecret {
    async fn fetch(&self) -> Result<String, SecretError> {
        Ok(self.0.clone())
    }
}

/// 取得済みの値を `ttl` の間だけ使い回す
///
/// 失敗はキャッシュしない。期限切れ後の最初の呼び出しで取り直す。
pub struct CachedSecret {
    inner: Arc<dyn SecretSource>,
    ttl: Duration,
    cached: Mutex<Option<(String, Instant)>>,
}

impl CachedSecret {
    pub fn new(inner: Arc<dyn SecretSource>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SecretSource for CachedSecret {
    async fn fetch(&self) -> Result<String, SecretError> {
        let mut cached = self.cached.lock().await;
        if let Some((value, fetched_at)) = cached.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(value.clone());
            }
        }
        let value = self.inner.fetch().await?;
        *cached = Some((value.clone(), Instant::now()));
        Ok(value)
    }
}

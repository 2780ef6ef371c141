//! SecretSource port - API キーなどの取得
//!
//! 設定ファイルには値を書かず、取得元（環境変数など）だけを書きます。
//! プロセス内に残してよいのは有効期限付きのキャッシュ（`impls::secret::CachedSecret`）だけです。

use async_trait::async_trait;

use crate::domain::errors::SecretError;

#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch(&self) -> Result<String, SecretError>;
}

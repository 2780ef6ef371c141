//! Task trait - kind タグと payload 型の対応付け
//!
//! # 学習ポイント
//! - Associated Constants (`const KIND`)
//! - 保存形式（`StoredTask` の JSON）との相互変換を trait のデフォルト実装に寄せる
//!
//! # 検証の順序
//! 1. serde でデシリアライズ（payload 側の `deny_unknown_fields` で未知フィールドを拒否）
//! 2. `validate()` でコード形式などを確認
//! 3. payload から導いた key と保存されている key が一致するか確認
//!
//! どれかに失敗した task は handler に渡さず Fatal として扱います。

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::errors::ValidationError;
use crate::domain::task::{NewTask, StoredTask, TaskKind};

/// Task は kind と payload 型を対応付ける
///
/// # Trait Bounds
/// - `Serialize + DeserializeOwned`: task store への保存と復元
/// - `Send + Sync + 'static`: handler を `Arc<dyn DynHandler>` に入れるため
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: TaskKind;

    /// kind 内で一意な key（payload から決まる）
    fn key(&self) -> String;

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// 投入用の `NewTask` を作る。検証に通らない payload は投入させない
    fn to_new_task(&self) -> Result<NewTask, ValidationError> {
        self.validate()?;
        Ok(NewTask {
            kind: Self::KIND,
            key: self.key(),
            payload: serde_json::to_value(self)?,
        })
    }

    /// 保存済み task を型付き payload に戻す
    fn from_stored(stored: &StoredTask) -> Result<Self, ValidationError> {
        if stored.kind != Self::KIND {
            return Err(ValidationError::WrongKind {
                expected: Self::KIND,
                actual: stored.kind,
            });
        }
        let task: Self = serde_json::from_value(stored.payload.clone())?;
        task.validate()?;
        let derived = task.key();
        if derived != stored.key {
            return Err(ValidationError::KeyMismatch {
                stored: stored.key.clone(),
                derived,
            });
        }
        Ok(task)
    }
}

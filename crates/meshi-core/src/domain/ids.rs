//! Identifiers (strongly-typed ULID ids).
//!
//! `Id<T>` は ULID を包み、`T`（PhantomData のマーカー型）で用途を区別します。
//! 呼び出し ID とロック所有者トークンを取り違えることはコンパイル時に防がれます。
//!
//! ## ULID を使う理由
//! - 生成順でソートできる（ログを時系列で追いやすい）
//! - 複数の compute unit で調整なしに生成できる

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// 各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "inv-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// 1 回の compute unit 起動
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Invocation {}

impl IdMarker for Invocation {
    fn prefix() -> &'static str {
        "inv-"
    }
}

/// ロックマーカーの所有者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockOwner {}

impl IdMarker for LockOwner {
    fn prefix() -> &'static str {
        "lock-"
    }
}

/// 失敗報告 1 件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Report {}

impl IdMarker for Report {
    fn prefix() -> &'static str {
        "err-"
    }
}

/// Identifier of one driver / job invocation (appears in logs and error reports).
pub type InvocationId = Id<Invocation>;

/// Token written into the lock marker by the writer that holds it.
pub type LockToken = Id<LockOwner>;

/// 同じ秒・同じ関数名の失敗ログを区別する
pub type ReportId = Id<Report>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let a = Ulid::new();
        let b = Ulid::new();

        let inv = InvocationId::from_ulid(a);
        let lock = LockToken::from_ulid(b);

        assert_eq!(inv.as_ulid(), a);
        assert_eq!(lock.as_ulid(), b);
        assert!(inv.to_string().starts_with("inv-"));
        assert!(lock.to_string().starts_with("lock-"));
        // let _: InvocationId = lock; // <- does not compile
    }

    #[test]
    fn ids_roundtrip_through_json() {
        let id = InvocationId::from_ulid(Ulid::new());
        let s = serde_json::to_string(&id).unwrap();
        let back: InvocationId = serde_json::from_str(&s).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn phantom_marker_costs_nothing() {
        assert_eq!(std::mem::size_of::<InvocationId>(), std::mem::size_of::<Ulid>());
    }
}

//! Task - 永続化される作業単位
//!
//! # 設計原則
//! - `(kind, key)` が一意。同じ key を再投入しても何も起きない（insert-if-absent）
//! - task は書き換えない。パラメータを変えるときは削除して新規投入する
//! - payload は kind ごとの型（`typed::Task`）で検証してから使う

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::ValidationError;

/// どの driver が処理するかを表すタグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKind {
    /// 小エリアのページ数を調べて、ページごとの ScrapingAbstract を作る
    RegisterPages,
    /// 一覧ページ 1 枚から店舗 ID・名前・サムネイルを取る
    ScrapingAbstract,
    /// 店舗 1 件の詳細（ジャンル・住所・営業時間・座標）を取る
    ScrapingDetail,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::RegisterPages,
        TaskKind::ScrapingAbstract,
        TaskKind::ScrapingDetail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::RegisterPages => "RegisterPages",
            TaskKind::ScrapingAbstract => "ScrapingAbstract",
            TaskKind::ScrapingDetail => "ScrapingDetail",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownKind(s.to_string()))
    }
}

/// 投入前の task（created_at は store が付ける）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub kind: TaskKind,
    pub key: String,
    pub payload: serde_json::Value,
}

/// Task store に保存されている task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTask {
    pub kind: TaskKind,
    pub key: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl StoredTask {
    pub fn from_new(task: NewTask, created_at: DateTime<Utc>) -> Self {
        Self {
            kind: task.kind,
            key: task.key,
            payload: task.payload,
            created_at,
        }
    }

    /// fetch 時の順序: 古い順、同時刻なら key 順
    pub fn fetch_order(&self, other: &Self) -> std::cmp::Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.key.cmp(&other.key))
    }
}

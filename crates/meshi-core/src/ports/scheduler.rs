//! ScheduleBackend port - 時刻起動のトリガー
//!
//! backend は「名前付きスケジュールの CRUD」だけを提供します。
//! 冪等な register / 存在しなくてもよい delete / 分単位の分散登録は
//! `app::schedules::ScheduleAdapter` が backend の上に組み立てます。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::SchedulerError;

/// いつ起動するか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "at", rename_all = "snake_case")]
pub enum Trigger {
    /// 毎分（driver の自己ループ）
    EveryMinute,
    /// 指定時刻に 1 回だけ。発火後に自動削除される
    At(DateTime<Utc>),
}

impl Trigger {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self {
            Trigger::EveryMinute => true,
            Trigger::At(at) => *at <= now,
        }
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self, Trigger::At(_))
    }
}

/// 1 つの compute target に紐づくトリガー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// group 内で一意（`kind` または `kind_key`）
    pub name: String,
    pub group: String,
    /// 起動する target の名前
    pub target: String,
    /// target を起動するときの実行主体
    pub identity: String,
    pub trigger: Trigger,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ScheduleBackend: Send + Sync {
    async fn get(&self, group: &str, name: &str) -> Result<Option<Schedule>, SchedulerError>;

    /// 既にあれば `SchedulerError::Conflict`
    async fn create(&self, schedule: &Schedule) -> Result<(), SchedulerError>;

    /// 無ければ `SchedulerError::NotFound`
    async fn delete(&self, group: &str, name: &str) -> Result<(), SchedulerError>;

    async fn list(&self, group: &str) -> Result<Vec<Schedule>, SchedulerError>;
}

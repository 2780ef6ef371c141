//! ScheduleAdapter - backend の上に組み立てるスケジュール操作
//!
//! # 設計原則
//! - `register` は get してから create。既にあれば何もしない（create の競合で負けても同じ）
//! - `delete` は存在しなくてもよい。Warning で通知するだけで ErrorSink には回さない
//! - `fan_out` は kind ごとの起点時刻から 1 分ずつずらして one-shot を並べる
//!
//! # driver との関係
//! - `arm(kind)`: kind 名の毎分スケジュールを登録する（自己ループ）
//! - `disarm(kind)`: それを消す。再開には外部からの登録が要る

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

use crate::config::{ConfigError, SchedulerConfig};
use crate::domain::errors::SchedulerError;
use crate::domain::task::TaskKind;
use crate::ports::{Clock, Notifier, Schedule, ScheduleBackend, Severity, Trigger, notify_best_effort};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    /// 発火済みで自動削除されていた、または最初から無かった
    AlreadyGone,
}

/// `fan_out` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOut {
    pub created: usize,
    pub existing: usize,
    /// 最初の 1 件の発火時刻（以降 1 分刻み）
    pub first_at: Option<DateTime<Utc>>,
}

/// group・実行主体・タイムゾーン・kind ごとの起点
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSettings {
    pub group: String,
    pub identity: String,
    pub utc_offset: FixedOffset,
    pub anchors: BTreeMap<TaskKind, NaiveTime>,
}

impl ScheduleSettings {
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, ConfigError> {
        let utc_offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            ConfigError::Invalid {
                field: "scheduler.utc_offset_hours".to_string(),
                reason: format!("{} is not a valid offset", config.utc_offset_hours),
            }
        })?;
        let mut anchors = BTreeMap::new();
        for kind in TaskKind::ALL {
            anchors.insert(kind, config.anchor(kind)?);
        }
        Ok(Self {
            group: config.group.clone(),
            identity: config.identity.clone(),
            utc_offset,
            anchors,
        })
    }
}

pub struct ScheduleAdapter {
    backend: Arc<dyn ScheduleBackend>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: ScheduleSettings,
}

impl ScheduleAdapter {
    pub fn new(
        backend: Arc<dyn ScheduleBackend>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            backend,
            notifier,
            clock,
            settings,
        }
    }

    pub fn group(&self) -> &str {
        &self.settings.group
    }

    pub async fn register(
        &self,
        name: &str,
        target: &str,
        trigger: Trigger,
    ) -> Result<Registration, SchedulerError> {
        if self.backend.get(&self.settings.group, name).await?.is_some() {
            tracing::debug!(schedule = name, "schedule already registered");
            return Ok(Registration::AlreadyExists);
        }

        let schedule = Schedule {
            name: name.to_string(),
            group: self.settings.group.clone(),
            target: target.to_string(),
            identity: self.settings.identity.clone(),
            trigger,
            created_at: self.clock.now(),
        };
        match self.backend.create(&schedule).await {
            Ok(()) => {
                tracing::info!(schedule = name, to = target, ?trigger, "schedule registered");
                Ok(Registration::Created)
            }
            // get と create の間に別の呼び出しが作った
            Err(SchedulerError::Conflict { .. }) => Ok(Registration::AlreadyExists),
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self, name: &str) -> Result<Removal, SchedulerError> {
        match self.backend.delete(&self.settings.group, name).await {
            Ok(()) => {
                tracing::info!(schedule = name, "schedule deleted");
                Ok(Removal::Deleted)
            }
            Err(SchedulerError::NotFound { .. }) => {
                tracing::info!(schedule = name, "schedule already gone");
                let message = format!("スケジュール {name} は既に削除されています。");
                notify_best_effort(self.notifier.as_ref(), Severity::Warning, &message).await;
                Ok(Removal::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn arm(&self, kind: TaskKind) -> Result<Registration, SchedulerError> {
        self.register(kind.as_str(), kind.as_str(), Trigger::EveryMinute)
            .await
    }

    pub async fn disarm(&self, kind: TaskKind) -> Result<Removal, SchedulerError> {
        self.delete(kind.as_str()).await
    }

    /// `keys` の task ごとに `{kind}_{key}` の one-shot を 1 分刻みで登録する
    pub async fn fan_out(&self, kind: TaskKind, keys: &[String]) -> Result<FanOut, SchedulerError> {
        let start = self.first_slot(kind);
        let mut report = FanOut {
            created: 0,
            existing: 0,
            first_at: (!keys.is_empty()).then_some(start),
        };
        for (i, key) in keys.iter().enumerate() {
            let at = start + Duration::minutes(i as i64);
            let name = format!("{kind}_{key}");
            match self.register(&name, kind.as_str(), Trigger::At(at)).await? {
                Registration::Created => report.created += 1,
                Registration::AlreadyExists => report.existing += 1,
            }
        }
        tracing::info!(%kind, created = report.created, existing = report.existing, "fan-out registered");
        Ok(report)
    }

    /// 今日の起点時刻。過ぎていれば翌日
    fn first_slot(&self, kind: TaskKind) -> DateTime<Utc> {
        let now = self.clock.now();
        let anchor = self
            .settings
            .anchors
            .get(&kind)
            .copied()
            .unwrap_or(NaiveTime::MIN);
        let local_date = now.with_timezone(&self.settings.utc_offset).date_naive();
        let Some(today) = local_date
            .and_time(anchor)
            .and_local_timezone(self.settings.utc_offset)
            .single()
        else {
            return now;
        };
        let slot = today.with_timezone(&Utc);
        if slot < now { slot + Duration::days(1) } else { slot }
    }
}

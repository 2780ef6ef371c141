//! ScheduleRunner - 期限の来たスケジュールを発火させる
//!
//! # フロー
//! 1. group のスケジュールを list し、`Trigger::is_due(now)` のものを選ぶ
//! 2. target 名で登録簿を引き、まとめて同時に起動する（join_all）
//! 3. 発火した one-shot を削除する（既に無ければそのまま）
//!
//! `SchedulerLoop` は `tick` を一定間隔で呼び続ける常駐ループです。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::invocation::Target;
use crate::domain::errors::SchedulerError;
use crate::ports::{Clock, ScheduleBackend};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fired: Vec<String>,
    /// target が登録されていないので発火できなかったスケジュール
    pub unknown: Vec<String>,
    pub removed: usize,
}

pub struct ScheduleRunner {
    backend: Arc<dyn ScheduleBackend>,
    group: String,
    targets: HashMap<String, Arc<dyn Target>>,
}

impl ScheduleRunner {
    pub fn new(backend: Arc<dyn ScheduleBackend>, group: impl Into<String>) -> Self {
        Self {
            backend,
            group: group.into(),
            targets: HashMap::new(),
        }
    }

    /// 同名の target は後から登録したものが勝つ
    pub fn with_target(mut self, target: Arc<dyn Target>) -> Self {
        self.targets.insert(target.name().to_string(), target);
        self
    }

    pub fn target(&self, name: &str) -> Option<Arc<dyn Target>> {
        self.targets.get(name).cloned()
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, SchedulerError> {
        let mut report = TickReport::default();
        let mut due = Vec::new();
        for schedule in self.backend.list(&self.group).await? {
            if !schedule.trigger.is_due(now) {
                continue;
            }
            match self.targets.get(&schedule.target) {
                Some(target) => due.push((schedule, Arc::clone(target))),
                None => {
                    tracing::warn!(schedule = %schedule.name, to = %schedule.target, "no such target");
                    report.unknown.push(schedule.name);
                }
            }
        }

        let invocations = due.iter().map(|(schedule, target)| {
            let event = json!({
                "schedule": schedule.name,
                "group": schedule.group,
                "fired_at": now,
            });
            target.invoke(event)
        });
        join_all(invocations).await;

        for (schedule, _) in due {
            if schedule.trigger.is_one_shot() {
                match self.backend.delete(&self.group, &schedule.name).await {
                    Ok(()) => report.removed += 1,
                    Err(SchedulerError::NotFound { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            report.fired.push(schedule.name);
        }
        if !report.fired.is_empty() {
            tracing::info!(fired = report.fired.len(), removed = report.removed, "tick");
        }
        Ok(report)
    }
}

/// `tick` を一定間隔で回す常駐ループ
///
/// - `shutdown_and_join` で止める。発火中の invocation は最後まで走らせる
pub struct SchedulerLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerLoop {
    pub fn spawn(runner: Arc<ScheduleRunner>, clock: Arc<dyn Clock>, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {}
                }
                if let Err(e) = runner.tick(clock.now()).await {
                    tracing::error!(error = %e, "scheduler tick failed");
                }
            }
        });
        Self { shutdown_tx, join }
    }

    pub async fn shutdown_and_join(self) {
        // receiver が先に落ちていても構わない
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "scheduler loop panicked");
        }
    }
}

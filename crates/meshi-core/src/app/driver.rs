//! LifecycleDriver - 1 invocation で 1 task を進める制御ループ
//!
//! # フロー
//! 1. `TaskStore::fetch_one(kind)` で最も古い task を取る
//! 2. 無ければ自分のスケジュールを外して終了（キューが空の正常状態）
//! 3. `DynHandler::handle_stored` で作業 → `WorkOutcome`
//! 4. `Done`: successors を投入 → 自分を削除 → 自分と successors の kind を arm
//! 5. `RetryLater` / `Fatal`: task は残したまま ErrorSink に報告し、自分を arm
//!
//! # 順序の不変条件
//! successors の投入は必ず自分の削除より先。途中で落ちても task は残り、
//! 次の invocation が同じ task をやり直す（at least once）。
//!
//! store や scheduler 自体の失敗は `DriverError` として呼び出し元
//! （`Invocation`）に返し、そこで ErrorSink に送られます。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::Instrument;

use super::invocation::Job;
use super::schedules::ScheduleAdapter;
use crate::domain::errors::{SchedulerError, StoreError};
use crate::domain::outcome::WorkOutcome;
use crate::domain::task::TaskKind;
use crate::ports::{ErrorSink, TaskStore};
use crate::typed::DynHandler;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("task store: {0}")]
    Store(#[from] StoreError),

    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// 1 invocation の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverReport {
    /// task が無かった。スケジュールは外した
    Drained,
    Completed {
        key: String,
        successors: usize,
        /// successors のうち新規に入った件数
        enqueued: usize,
    },
    /// 作業に失敗した。task は残っている
    Retained {
        key: String,
        fatal: bool,
        reason: String,
    },
}

pub struct LifecycleDriver {
    handler: Arc<dyn DynHandler>,
    tasks: Arc<dyn TaskStore>,
    schedules: Arc<ScheduleAdapter>,
    sink: Arc<dyn ErrorSink>,
}

impl LifecycleDriver {
    pub fn new(
        handler: Arc<dyn DynHandler>,
        tasks: Arc<dyn TaskStore>,
        schedules: Arc<ScheduleAdapter>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            handler,
            tasks,
            schedules,
            sink,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.handler.kind()
    }

    pub async fn run_once(&self) -> Result<DriverReport, DriverError> {
        let kind = self.kind();
        let Some(task) = self.tasks.fetch_one(kind).await? else {
            self.schedules.disarm(kind).await?;
            tracing::info!(%kind, "no pending task, schedule disarmed");
            return Ok(DriverReport::Drained);
        };

        let span = tracing::info_span!("task", %kind, key = %task.key);
        let outcome = self
            .handler
            .handle_stored(&task)
            .instrument(span.clone())
            .await;
        let successor_kinds = outcome.successor_kinds();

        match outcome {
            WorkOutcome::Done { successors } => {
                let enqueued = self.tasks.enqueue(&successors).await?;
                self.tasks.delete(kind, &task.key).await?;
                self.schedules.arm(kind).await?;
                for next in successor_kinds.into_iter().filter(|k| *k != kind) {
                    self.schedules.arm(next).await?;
                }
                span.in_scope(|| {
                    tracing::info!(successors = successors.len(), enqueued, "task completed")
                });
                Ok(DriverReport::Completed {
                    key: task.key,
                    successors: successors.len(),
                    enqueued,
                })
            }
            WorkOutcome::RetryLater(reason) => self.retain(task.key, false, reason).await,
            WorkOutcome::Fatal(reason) => self.retain(task.key, true, reason).await,
        }
    }

    async fn retain(
        &self,
        key: String,
        fatal: bool,
        reason: String,
    ) -> Result<DriverReport, DriverError> {
        let kind = self.kind();
        let label = if fatal { "fatal" } else { "retry later" };
        tracing::warn!(%kind, %key, %reason, label, "task kept for the next invocation");

        let message = format!("task {kind}/{key} failed ({label}): {reason}");
        self.sink.report(kind.as_str(), &message).await;
        self.schedules.arm(kind).await?;
        Ok(DriverReport::Retained { key, fatal, reason })
    }
}

#[async_trait]
impl Job for LifecycleDriver {
    type Report = DriverReport;
    type Error = DriverError;

    async fn run(&self) -> Result<DriverReport, DriverError> {
        self.run_once().await
    }
}

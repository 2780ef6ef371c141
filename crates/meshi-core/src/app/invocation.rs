//! Invocation - compute unit 1 回分の境界
//!
//! どの job もこの境界の内側で動きます。
//!
//! 1. invocation id を発行し、span に載せる
//! 2. job を実行する。`Err` も panic もここで捕まえる
//! 3. 失敗は関数名とイベント本文を添えて ErrorSink に送る
//! 4. 成否にかかわらず `{statusCode: 200, body: "Process Complete"}` を返す
//!
//! 呼び出し元から失敗は見えません。見えるのは ErrorSink の先だけです。

use std::any::Any;
use std::fmt::{Debug, Display};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::ports::{ErrorSink, IdGenerator};

/// 呼び出し元に返す応答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl Envelope {
    pub fn complete() -> Self {
        Self {
            status_code: 200,
            body: "Process Complete".to_string(),
        }
    }
}

/// 境界の内側で動かす処理
#[async_trait]
pub trait Job: Send + Sync {
    type Report: Debug + Send;
    type Error: Display + Send;

    async fn run(&self) -> Result<Self::Report, Self::Error>;
}

/// スケジュールから起動できるもの（runner の登録簿に入る）
#[async_trait]
pub trait Target: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, event: serde_json::Value) -> Envelope;
}

pub struct Invocation {
    function_name: String,
    sink: Arc<dyn ErrorSink>,
    ids: Arc<dyn IdGenerator>,
}

impl Invocation {
    pub fn new(
        function_name: impl Into<String>,
        sink: Arc<dyn ErrorSink>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            sink,
            ids,
        }
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub async fn run<J: Job + ?Sized>(&self, event: &serde_json::Value, job: &J) -> Envelope {
        let invocation_id = self.ids.invocation_id();
        let span = tracing::info_span!(
            "invocation",
            function = %self.function_name,
            invocation_id = %invocation_id,
        );

        let result = AssertUnwindSafe(job.run())
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let failure = match result {
            Ok(Ok(report)) => {
                span.in_scope(|| tracing::info!(?report, "invocation finished"));
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!("panicked: {}", panic_message(panic.as_ref()))),
        };

        if let Some(reason) = failure {
            span.in_scope(|| tracing::error!(%reason, "invocation failed"));
            let message = format!("{reason}\n\n実行ID：{invocation_id}\nイベント：{event}");
            self.sink.report(&self.function_name, &message).await;
        }
        Envelope::complete()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Job を名前付きの Target にする
pub struct JobTarget<J: Job> {
    job: J,
    invocation: Invocation,
}

impl<J: Job> JobTarget<J> {
    /// target 名は Invocation の関数名と同じ
    pub fn new(job: J, invocation: Invocation) -> Self {
        Self { job, invocation }
    }

    pub fn job(&self) -> &J {
        &self.job
    }
}

#[async_trait]
impl<J: Job> Target for JobTarget<J> {
    fn name(&self) -> &str {
        self.invocation.function_name()
    }

    async fn invoke(&self, event: serde_json::Value) -> Envelope {
        self.invocation.run(&event, &self.job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::error_sink::RecordingSink;
    use crate::ports::{SystemClock, UlidGenerator};
    use serde_json::json;

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
    }

    struct Scripted(Behaviour);

    #[async_trait]
    impl Job for Scripted {
        type Report = &'static str;
        type Error = String;

        async fn run(&self) -> Result<&'static str, String> {
            match self.0 {
                Behaviour::Succeed => Ok("ok"),
                Behaviour::Fail => Err("listing site returned 503".to_string()),
                Behaviour::Panic => panic!("parser exploded"),
            }
        }
    }

    fn invocation(sink: Arc<RecordingSink>) -> Invocation {
        Invocation::new(
            "ScrapingDetail",
            sink,
            Arc::new(UlidGenerator::new(Arc::new(SystemClock))),
        )
    }

    #[tokio::test]
    async fn success_is_not_reported() {
        let sink = Arc::new(RecordingSink::default());
        let envelope = invocation(sink.clone())
            .run(&json!({}), &Scripted(Behaviour::Succeed))
            .await;

        assert_eq!(envelope, Envelope::complete());
        assert!(sink.reports().await.is_empty());
    }

    #[tokio::test]
    async fn errors_are_reported_with_the_event_and_still_answer_200() {
        let sink = Arc::new(RecordingSink::default());
        let envelope = invocation(sink.clone())
            .run(&json!({"schedule": "ScrapingDetail"}), &Scripted(Behaviour::Fail))
            .await;

        assert_eq!(envelope.status_code, 200);
        let reports = sink.reports().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "ScrapingDetail");
        assert!(reports[0].1.contains("listing site returned 503"));
        assert!(reports[0].1.contains(r#"イベント：{"schedule":"ScrapingDetail"}"#));
        assert!(reports[0].1.contains("実行ID：inv-"));
    }

    #[tokio::test]
    async fn panics_are_caught_and_reported() {
        let sink = Arc::new(RecordingSink::default());
        let envelope = invocation(sink.clone())
            .run(&json!({}), &Scripted(Behaviour::Panic))
            .await;

        assert_eq!(envelope, Envelope::complete());
        let reports = sink.reports().await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].1.contains("parser exploded"));
    }

    #[tokio::test]
    async fn job_target_uses_the_function_name() {
        let sink = Arc::new(RecordingSink::default());
        let target = JobTarget::new(Scripted(Behaviour::Succeed), invocation(sink));
        assert_eq!(target.name(), "ScrapingDetail");
        assert_eq!(target.invoke(json!({})).await, Envelope::complete());
    }

    #[test]
    fn envelope_uses_the_platform_field_name() {
        let v = serde_json::to_value(Envelope::complete()).unwrap();
        assert_eq!(v, json!({"statusCode": 200, "body": "Process Complete"}));
    }
}

//! 新着店舗の通知
//!
//! 完成済みで未通知の店舗をまとめて 1 通にして送り、届いたものだけを通知済みにします。
//! 送信に失敗したら何も書き換えないので、次回もう一度同じ店舗が選ばれます。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::invocation::Job;
use crate::domain::errors::{DbError, NotifyError};
use crate::domain::restaurant::NewRestaurant;
use crate::ports::{Database, Notifier, Severity};
use crate::repo::restaurants;

pub const NO_NEW_RESTAURANTS: &str = "新規の飲食店はありませんでした。";

#[derive(Debug, Error)]
pub enum NotifyNewError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("new-restaurant notice not delivered: {0}")]
    Notify(#[from] NotifyError),
}

pub struct NewRestaurantNotifier {
    db: Arc<dyn Database>,
    notifier: Arc<dyn Notifier>,
    site_base_url: String,
}

impl NewRestaurantNotifier {
    pub fn new(db: Arc<dyn Database>, notifier: Arc<dyn Notifier>, site_base_url: impl Into<String>) -> Self {
        Self {
            db,
            notifier,
            site_base_url: site_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// 戻り値は通知済みにした件数
    pub async fn run_once(&self) -> Result<usize, NotifyNewError> {
        let fresh = restaurants::unnotified(self.db.as_ref()).await?;
        if fresh.is_empty() {
            self.notifier.notify(Severity::Warning, NO_NEW_RESTAURANTS).await?;
            return Ok(0);
        }

        let message = compose(&fresh, &self.site_base_url);
        self.notifier.notify(Severity::Normal, &message).await?;

        let ids: Vec<String> = fresh.into_iter().map(|r| r.id).collect();
        restaurants::mark_notified(self.db.as_ref(), &ids).await?;
        tracing::info!(count = ids.len(), "new restaurants notified");
        Ok(ids.len())
    }
}

fn compose(fresh: &[NewRestaurant], base_url: &str) -> String {
    let mut message = String::from("新しい飲食店が登録されました。\n");
    for r in fresh {
        let genre = match &r.sub_genre_name {
            Some(sub) => format!("{} / {sub}", r.genre_name),
            None => r.genre_name.clone(),
        };
        message.push_str(&format!(
            "\n■店名：{}\n・ジャンル：{genre}\n・住所：{}\n{base_url}/str{}/\n",
            r.name, r.address, r.id
        ));
    }
    message
}

#[async_trait]
impl Job for NewRestaurantNotifier {
    type Report = usize;
    type Error = NotifyNewError;

    async fn run(&self) -> Result<usize, NotifyNewError> {
        self.run_once().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::area::sample_area;
    use crate::impls::notifier::RecordingNotifier;
    use crate::impls::single_file_db::schema_database;
    use crate::repo::reference::tests::seed_reference;
    use crate::repo::restaurants::tests::{completed, entry};

    async fn seeded() -> Arc<crate::impls::SingleFileDatabase> {
        let db = Arc::new(schema_database().await);
        seed_reference(db.as_ref()).await;
        restaurants::save_abstracts(
            db.as_ref(),
            &sample_area(),
            &[entry("J1", "大宮酒場", true), entry("J2", "まだ途中", false)],
        )
        .await
        .unwrap();
        restaurants::complete_detail(db.as_ref(), "J1", &completed(35.9, 139.6, &[]))
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn complete_rows_are_sent_once() {
        let db = seeded().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let job = NewRestaurantNotifier::new(db.clone(), notifier.clone(), "https://listing.example/");

        assert_eq!(job.run_once().await.unwrap(), 1);
        assert_eq!(job.run_once().await.unwrap(), 0);

        let sent = notifier.messages().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, Severity::Normal);
        assert!(sent[0].1.contains("■店名：大宮酒場"));
        assert!(sent[0].1.contains("・ジャンル：居酒屋"));
        assert!(sent[0].1.contains("https://listing.example/strJ1/"));
        assert!(!sent[0].1.contains("まだ途中"));
        assert_eq!(sent[1], (Severity::Warning, NO_NEW_RESTAURANTS.to_string()));
    }

    #[tokio::test]
    async fn undelivered_notice_keeps_rows_pending() {
        let db = seeded().await;
        let job = NewRestaurantNotifier::new(db.clone(), Arc::new(RecordingNotifier::failing()), "https://listing.example");

        assert!(matches!(job.run_once().await, Err(NotifyNewError::Notify(_))));
        assert_eq!(restaurants::unnotified(db.as_ref()).await.unwrap().len(), 1);
    }
}

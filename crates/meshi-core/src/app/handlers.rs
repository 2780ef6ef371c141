//! Handlers - kind ごとの 1 単位の作業
//!
//! | kind | 作業 | successors |
//! |------|------|------------|
//! | RegisterPages | 一覧 1 ページ目からページ数 N を読む | ScrapingAbstract × N |
//! | ScrapingAbstract | 一覧 1 ページ分の店舗を未完成行として upsert | ScrapingDetail × 店舗数 |
//! | ScrapingDetail | 詳細を取り、住所をジオコーディングして行を完成させる | なし |
//!
//! どれも再実行に耐えます（upsert と insert-if-absent の投入だけを使う）。

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::outcome::{WorkError, WorkOutcome};
use crate::domain::payload::{RegisterPages, ScrapingAbstract, ScrapingDetail};
use crate::ports::{Database, Geocoder, ListingSite};
use crate::repo::{reference, restaurants};
use crate::typed::{Handler, Task};

pub struct RegisterPagesHandler {
    site: Arc<dyn ListingSite>,
}

impl RegisterPagesHandler {
    pub fn new(site: Arc<dyn ListingSite>) -> Self {
        Self { site }
    }
}

#[async_trait]
impl Handler<RegisterPages> for RegisterPagesHandler {
    async fn handle(&self, task: RegisterPages) -> Result<WorkOutcome, WorkError> {
        let pages = self.site.page_count(&task.area).await?;
        tracing::info!(area = %task.area.small_area_code, pages, "page count read");

        let successors = (1..=pages)
            .map(|page| {
                ScrapingAbstract {
                    area: task.area.clone(),
                    page,
                }
                .to_new_task()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WorkOutcome::done_with(successors))
    }
}

pub struct ScrapingAbstractHandler {
    site: Arc<dyn ListingSite>,
    db: Arc<dyn Database>,
}

impl ScrapingAbstractHandler {
    pub fn new(site: Arc<dyn ListingSite>, db: Arc<dyn Database>) -> Self {
        Self { site, db }
    }
}

#[async_trait]
impl Handler<ScrapingAbstract> for ScrapingAbstractHandler {
    async fn handle(&self, task: ScrapingAbstract) -> Result<WorkOutcome, WorkError> {
        let entries = self.site.abstracts(&task.area, task.page).await?;

        // 壊れた id が 1 つでもあれば何も書かない
        let mut successors = Vec::with_capacity(entries.len());
        for entry in &entries {
            let detail = ScrapingDetail {
                id: entry.id.clone(),
            };
            successors.push(detail.to_new_task()?);
        }
        successors.dedup_by(|a, b| a.key == b.key);

        restaurants::save_abstracts(self.db.as_ref(), &task.area, &entries).await?;
        tracing::info!(
            area = %task.area.small_area_code,
            page = task.page,
            restaurants = entries.len(),
            "abstracts saved"
        );
        Ok(WorkOutcome::done_with(successors))
    }
}

pub struct ScrapingDetailHandler {
    site: Arc<dyn ListingSite>,
    geocoder: Arc<dyn Geocoder>,
    db: Arc<dyn Database>,
}

impl ScrapingDetailHandler {
    pub fn new(site: Arc<dyn ListingSite>, geocoder: Arc<dyn Geocoder>, db: Arc<dyn Database>) -> Self {
        Self { site, geocoder, db }
    }

    async fn genre_code(&self, name: &str) -> Result<String, WorkError> {
        reference::genre_code(self.db.as_ref(), name)
            .await?
            .ok_or_else(|| WorkError::fatal(format!("genre `{name}` is not in genre_master")))
    }
}

#[async_trait]
impl Handler<ScrapingDetail> for ScrapingDetailHandler {
    async fn handle(&self, task: ScrapingDetail) -> Result<WorkOutcome, WorkError> {
        let info = self.site.detail(&task.id).await?;
        if info.address.trim().is_empty() {
            return Err(WorkError::fatal(format!("restaurant {} has no address", task.id)));
        }

        let genre_code = self.genre_code(&info.genre).await?;
        let sub_genre_code = match info.sub_genre.as_deref() {
            Some(name) => Some(self.genre_code(name).await?),
            None => None,
        };
        let location = self.geocoder.geocode(&info.address).await?;

        let completed = restaurants::CompletedDetail {
            genre_code,
            sub_genre_code,
            address: info.address,
            location,
            open_hours: info.open_hours,
            close_days: info.close_days,
            parking: info.parking,
            images: info.images,
        };
        let updated = restaurants::complete_detail(self.db.as_ref(), &task.id, &completed).await?;
        if updated == 0 {
            return Err(WorkError::fatal(format!(
                "restaurant {} has no row from the listing pass",
                task.id
            )));
        }
        tracing::info!(id = %task.id, images = completed.images.len(), "restaurant completed");
        Ok(WorkOutcome::done())
    }
}

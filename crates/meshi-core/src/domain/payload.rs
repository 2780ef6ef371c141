//! Payload - kind ごとの task パラメータ
//!
//! 3 つの kind それぞれに専用の型を持たせ、`typed::Task` を実装します。
//! いずれも `deny_unknown_fields` で、知らないフィールドが混ざった payload は拒否します。

use serde::{Deserialize, Serialize};

use super::area::{AreaPath, validate_restaurant_id};
use super::errors::ValidationError;
use super::task::TaskKind;
use crate::typed::Task;

/// 小エリア 1 つ分のページ数調査
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterPages {
    pub area: AreaPath,
}

impl Task for RegisterPages {
    const KIND: TaskKind = TaskKind::RegisterPages;

    fn key(&self) -> String {
        self.area.small_area_code.clone()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        self.area.validate()
    }
}

/// 一覧ページ 1 枚分のスクレイピング
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrapingAbstract {
    pub area: AreaPath,
    pub page: u32,
}

impl Task for ScrapingAbstract {
    const KIND: TaskKind = TaskKind::ScrapingAbstract;

    fn key(&self) -> String {
        format!("{}_{}", self.area.small_area_code, self.page)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.page == 0 {
            return Err(ValidationError::field("page", "0"));
        }
        self.area.validate()
    }
}

/// 店舗 1 件分の詳細スクレイピング
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrapingDetail {
    pub id: String,
}

impl Task for ScrapingDetail {
    const KIND: TaskKind = TaskKind::ScrapingDetail;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_restaurant_id(&self.id)
    }
}

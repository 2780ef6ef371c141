//! Restaurant - 店舗レコードと読み取りモデル
//!
//! 行は abstract フェーズで「未完成」として作られ、detail フェーズで
//! ジャンル・住所・座標・営業時間が埋まった時点で `is_complete = 1` になります。
//! 地理検索は完成済みの行しか返しません。

use serde::{Deserialize, Serialize};

/// 一覧ページ 1 件分（abstract フェーズの抽出結果）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub id: String,
    pub name: String,
    pub thumbnail_url: Option<String>,
}

/// 写真ページの 1 枚
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub alt: String,
}

/// 詳細ページの抽出結果（detail フェーズ）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetailInfo {
    pub genre: String,
    pub sub_genre: Option<String>,
    pub address: String,
    pub open_hours: String,
    pub close_days: String,
    pub parking: String,
    pub images: Vec<ImageRef>,
}

/// 地理検索の 1 行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub genre_name: String,
    pub parking: String,
    pub is_thumbnail: i64,
    /// 基準点があるときだけ km 単位で入る
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub order_num: i64,
    pub alt: String,
}

/// 店舗詳細 API の応答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantDetail {
    pub name: String,
    pub genre: String,
    pub sub_genre: Option<String>,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub open_hours: String,
    pub close_days: String,
    pub parking: String,
    pub images: Vec<ImageSummary>,
}

/// まだ通知していない完成済み店舗
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRestaurant {
    pub id: String,
    pub name: String,
    pub genre_name: String,
    pub sub_genre_name: Option<String>,
    pub address: String,
}
